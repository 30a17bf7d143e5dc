// GNU AGPL v3 License

use anyhow::{anyhow, Result};
use ffmpeg::format::{sample::Type, Sample};

/// Decode interleaved PCM bytes into mono `f32` samples.
///
/// Multiple channels are averaged together. Only the first `frames` frames
/// of `data` are read, since ffmpeg pads its buffers.
pub(crate) fn decode_samples(
    data: &[u8],
    format: Sample,
    channels: usize,
    frames: usize,
) -> Result<impl Iterator<Item = f32> + '_> {
    let (sz, signed, floating, planar) = match &format {
        Sample::None => return Err(anyhow!("Cannot decode samples of type `None`")),
        Sample::U8(form) => (1, false, false, ty_is_planar(form)),
        Sample::I16(form) => (2, true, false, ty_is_planar(form)),
        Sample::I32(form) => (4, true, false, ty_is_planar(form)),
        Sample::I64(form) => (8, true, false, ty_is_planar(form)),
        Sample::F32(form) => (4, true, true, ty_is_planar(form)),
        Sample::F64(form) => (8, true, true, ty_is_planar(form)),
    };

    if channels == 0 {
        return Err(anyhow!("Cannot decode samples without channels"));
    }
    if planar && channels > 1 {
        return Err(anyhow!("Cannot down-mix {} planar channels", channels));
    }

    let len = sz * channels * frames;
    let data = data.get(..len).ok_or_else(|| {
        anyhow!(
            "Sample buffer holds {} bytes, expected at least {}",
            data.len(),
            len
        )
    })?;

    Ok(data.chunks_exact(sz * channels).map(move |frame| {
        let sum = frame
            .chunks_exact(sz)
            .map(|chunk| match (sz, signed, floating) {
                (1, false, false) => (chunk[0] as f64 - 128.0) / 128.0,
                (2, true, false) => {
                    bytemuck::pod_read_unaligned::<i16>(chunk) as f64 / i16::MAX as f64
                }
                (4, true, false) => {
                    bytemuck::pod_read_unaligned::<i32>(chunk) as f64 / i32::MAX as f64
                }
                (4, true, true) => bytemuck::pod_read_unaligned::<f32>(chunk) as f64,
                (8, true, false) => {
                    bytemuck::pod_read_unaligned::<i64>(chunk) as f64 / i64::MAX as f64
                }
                (8, true, true) => bytemuck::pod_read_unaligned::<f64>(chunk),
                _ => unreachable!(),
            })
            .sum::<f64>();

        (sum / channels as f64) as f32
    }))
}

fn ty_is_planar(ty: &Type) -> bool {
    matches!(ty, Type::Planar)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn packed_f32_passes_through() {
        let values = [0.25f32, -0.5, 1.0];
        let bytes = bytemuck::cast_slice::<f32, u8>(&values);

        let decoded = decode_samples(bytes, Sample::F32(Type::Packed), 1, 3)
            .unwrap()
            .collect::<Vec<_>>();
        assert_eq!(decoded, vec![0.25, -0.5, 1.0]);
    }

    #[test]
    fn stereo_i16_is_averaged() {
        let values = [i16::MAX, 0, i16::MIN + 1, i16::MIN + 1];
        let bytes = bytemuck::cast_slice::<i16, u8>(&values);

        let decoded = decode_samples(bytes, Sample::I16(Type::Packed), 2, 2)
            .unwrap()
            .collect::<Vec<_>>();
        assert!((decoded[0] - 0.5).abs() < 1e-6);
        assert!((decoded[1] + 1.0).abs() < 1e-6);
    }

    #[test]
    fn padding_is_ignored() {
        let values = [0.1f32, 0.2, 0.0, 0.0];
        let bytes = bytemuck::cast_slice::<f32, u8>(&values);

        let decoded = decode_samples(bytes, Sample::F32(Type::Packed), 1, 2)
            .unwrap()
            .count();
        assert_eq!(decoded, 2);
    }

    #[test]
    fn short_buffer_is_an_error() {
        let bytes = [0u8; 6];
        assert!(decode_samples(&bytes, Sample::F32(Type::Packed), 1, 2).is_err());
    }

    #[test]
    fn planar_stereo_is_rejected() {
        let bytes = [0u8; 16];
        assert!(decode_samples(&bytes, Sample::F32(Type::Planar), 2, 2).is_err());
    }
}
