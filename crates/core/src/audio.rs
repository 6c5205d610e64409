//! PCM16 audio helpers

use crate::error::{Error, Result};

/// Decode a little-endian PCM16 frame into samples.
///
/// A frame with an odd byte count is malformed; the caller drops it and
/// continues.
pub fn decode_pcm16(frame: &[u8]) -> Result<Vec<i16>> {
    if frame.len() % 2 != 0 {
        return Err(Error::Transcode(format!(
            "odd PCM16 frame length: {} bytes",
            frame.len()
        )));
    }
    Ok(frame
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
        .collect())
}

/// Root-mean-square level of a PCM16 sample frame.
///
/// Returns 0.0 for an empty frame.
pub fn frame_rms(samples: &[i16]) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_sq: f64 = samples.iter().map(|&s| (s as f64) * (s as f64)).sum();
    (sum_sq / samples.len() as f64).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame_of(amplitude: i16, samples: usize) -> Vec<u8> {
        amplitude
            .to_le_bytes()
            .iter()
            .copied()
            .cycle()
            .take(samples * 2)
            .collect()
    }

    #[test]
    fn test_decode_rejects_odd_length() {
        assert!(matches!(decode_pcm16(&[0x01]), Err(Error::Transcode(_))));
        assert!(decode_pcm16(&[0x01, 0x02]).is_ok());
    }

    #[test]
    fn test_rms_of_constant_amplitude() {
        let samples = decode_pcm16(&frame_of(1500, 2048)).unwrap();
        let rms = frame_rms(&samples);
        assert!((rms - 1500.0).abs() < 1e-6, "rms was {rms}");
    }

    #[test]
    fn test_rms_of_silence() {
        let samples = decode_pcm16(&frame_of(0, 512)).unwrap();
        assert_eq!(frame_rms(&samples), 0.0);
        assert_eq!(frame_rms(&[]), 0.0);
    }

    #[test]
    fn test_rms_handles_negative_samples() {
        let samples = vec![-1000i16, 1000, -1000, 1000];
        let rms = frame_rms(&samples);
        assert!((rms - 1000.0).abs() < 1e-6);
    }
}
