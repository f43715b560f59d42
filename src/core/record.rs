use crate::core::{Error, Result};

/// Number of value slots carried by every task.
pub const VARS_PER_TASK: usize = 4;

/// Encoded size of one record on disk.
pub const RECORD_SIZE: usize = 32;

const CRC_OFFSET: usize = RECORD_SIZE - 4;

/// One sample as persisted in a chunk file.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LogRecord {
    pub timestamp: u32,
    pub task_index: u8,
    pub controller_index: u8,
    pub plugin_id: u16,
    pub sensor_type: u8,
    pub value_count: u8,
    pub values: [f32; VARS_PER_TASK],
}

impl LogRecord {
    pub fn new(timestamp: u32, task_index: u8, plugin_id: u16, values: [f32; VARS_PER_TASK]) -> Self {
        Self {
            timestamp,
            task_index,
            controller_index: 0,
            plugin_id,
            sensor_type: 0,
            value_count: VARS_PER_TASK as u8,
            values,
        }
    }

    pub fn to_bytes(&self) -> [u8; RECORD_SIZE] {
        let mut buf = [0u8; RECORD_SIZE];
        buf[0..4].copy_from_slice(&self.timestamp.to_le_bytes());
        buf[4] = self.task_index;
        buf[5] = self.controller_index;
        buf[6..8].copy_from_slice(&self.plugin_id.to_le_bytes());
        buf[8] = self.sensor_type;
        buf[9] = self.value_count;
        // 10..12 reserved
        for (slot, value) in self.values.iter().enumerate() {
            let start = 12 + slot * 4;
            buf[start..start + 4].copy_from_slice(&value.to_le_bytes());
        }
        let crc = Self::crc32(&buf[..CRC_OFFSET]);
        buf[CRC_OFFSET..].copy_from_slice(&crc.to_le_bytes());
        buf
    }

    pub fn from_bytes(bytes: &[u8; RECORD_SIZE]) -> Result<Self> {
        let checksum = u32::from_le_bytes(bytes[CRC_OFFSET..].try_into().expect("slice length"));
        if Self::crc32(&bytes[..CRC_OFFSET]) != checksum {
            return Err(Error::Corrupt("crc mismatch"));
        }
        let timestamp = u32::from_le_bytes(bytes[0..4].try_into().expect("slice length"));
        let plugin_id = u16::from_le_bytes(bytes[6..8].try_into().expect("slice length"));
        let mut values = [0f32; VARS_PER_TASK];
        for (slot, value) in values.iter_mut().enumerate() {
            let start = 12 + slot * 4;
            *value = f32::from_le_bytes(bytes[start..start + 4].try_into().expect("slice length"));
        }
        Ok(Self {
            timestamp,
            task_index: bytes[4],
            controller_index: bytes[5],
            plugin_id,
            sensor_type: bytes[8],
            value_count: bytes[9],
            values,
        })
    }

    pub fn crc32(payload: &[u8]) -> u32 {
        use crc32fast::Hasher;
        let mut hasher = Hasher::new();
        hasher.update(payload);
        hasher.finalize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_is_little_endian() {
        let record = LogRecord::new(0x0102_0304, 7, 0x0a0b, [1.5, 0.0, -2.0, 0.25]);
        let bytes = record.to_bytes();
        assert_eq!(&bytes[0..4], &[0x04, 0x03, 0x02, 0x01]);
        assert_eq!(bytes[4], 7);
        assert_eq!(&bytes[6..8], &[0x0b, 0x0a]);
        assert_eq!(bytes[9], VARS_PER_TASK as u8);
        assert_eq!(LogRecord::from_bytes(&bytes).unwrap(), record);
    }

    #[test]
    fn flipped_bit_fails_crc() {
        let mut bytes = LogRecord::new(100, 1, 5, [1.0; VARS_PER_TASK]).to_bytes();
        bytes[14] ^= 0x40;
        assert!(matches!(
            LogRecord::from_bytes(&bytes),
            Err(Error::Corrupt("crc mismatch"))
        ));
    }

    #[test]
    fn crc_matches_known_payload() {
        assert_eq!(LogRecord::crc32(b"hello"), 0x3610A686);
    }
}
