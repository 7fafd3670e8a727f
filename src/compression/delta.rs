use crate::core::error::{Error, ErrorKind, Result};
use crate::compression::vbyte::VByte;

/// Delta variant of the variable-byte codec.
///
/// Encodes a non-decreasing sequence as successive differences from an
/// initial value and reconstructs it with a running prefix sum.
pub struct DeltaVByte;

impl DeltaVByte {
    /// Encode `values` as deltas starting from `initial`.
    /// The sequence must be non-decreasing and start at >= `initial`.
    pub fn encode(output: &mut Vec<u8>, values: &[u64], initial: u64) -> Result<()> {
        let mut previous = initial;
        for &value in values {
            if value < previous {
                return Err(Error::new(
                    ErrorKind::InvalidArgument,
                    format!("delta encoding requires non-decreasing input ({} after {})", value, previous),
                ));
            }
            VByte::encode(output, value - previous);
            previous = value;
        }
        Ok(())
    }

    /// Decode exactly `count` values starting at `*pos`, running the
    /// prefix sum from `initial`.
    pub fn decode_n(input: &[u8], pos: &mut usize, count: usize, initial: u64) -> Result<Vec<u64>> {
        let mut values = Vec::with_capacity(count);
        let mut previous = initial;
        for _ in 0..count {
            previous += VByte::decode(input, pos)?;
            values.push(previous);
        }
        Ok(values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delta_round_trip() {
        let values = [1u64, 5, 6, 8, 12, 14, 20, 23];
        let mut buf = Vec::new();
        DeltaVByte::encode(&mut buf, &values, 0).unwrap();

        let mut pos = 0;
        let decoded = DeltaVByte::decode_n(&buf, &mut pos, values.len(), 0).unwrap();
        assert_eq!(decoded, values);
        assert_eq!(pos, buf.len());
    }

    #[test]
    fn test_delta_with_nonzero_initial() {
        let values = [100u64, 100, 103];
        let mut buf = Vec::new();
        DeltaVByte::encode(&mut buf, &values, 98).unwrap();
        let mut pos = 0;
        let decoded = DeltaVByte::decode_n(&buf, &mut pos, 3, 98).unwrap();
        assert_eq!(decoded, values);
    }

    #[test]
    fn test_decreasing_input_rejected() {
        let mut buf = Vec::new();
        let err = DeltaVByte::encode(&mut buf, &[5, 3], 0).unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidArgument);
    }
}
