//! CRC-16/MODBUS: polynomial 0xA001 (bit-reflected 0x8005), seed 0xFFFF,
//! LSB-first, no final xor.

const POLY: u16 = 0xA001;
const SEED: u16 = 0xFFFF;

/// Checksum over a byte range. Deterministic, no shared state.
pub fn crc16_modbus(data: &[u8]) -> u16 {
    let mut crc = SEED;
    for &byte in data {
        crc ^= u16::from(byte);
        for _ in 0..8 {
            if crc & 1 != 0 {
                crc = (crc >> 1) ^ POLY;
            } else {
                crc >>= 1;
            }
        }
    }
    crc
}
