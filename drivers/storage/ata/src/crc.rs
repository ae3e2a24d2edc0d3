// SPDX-License-Identifier: MPL-2.0
const POLY: u16 = 0x8BB7;

/// CRC-16 (polynomial 0x8BB7, zero initial value) as used by the IntelliProp log pages.
///
/// Bits are shifted in MSB first. To compute a new CRC the message is augmented with two zero
/// bytes; pass `check` when `data` already ends with its CRC. Either way a buffer that carries
/// a valid big endian CRC in its last two bytes yields 0.
pub fn crc16(data: &[u8], check: bool) -> u16 {
    let tail: &[u8] = if check { &[] } else { &[0, 0] };
    let mut crc = 0u16;
    for &byte in data.iter().chain(tail) {
        for bit in (0..8).rev() {
            let msb = crc & 0x8000 != 0;
            crc = crc << 1 | u16::from(byte >> bit & 1);
            if msb {
                crc ^= POLY;
            }
        }
    }
    crc
}
