//! Chunk loudness and channel layout helpers.

/// Mean of absolute sample values, `0.0` for an empty chunk.
pub fn mean_abs(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    samples.iter().map(|s| s.abs()).sum::<f32>() / samples.len() as f32
}

/// Root mean square, `0.0` for an empty chunk.
pub fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    (samples.iter().map(|s| s * s).sum::<f32>() / samples.len() as f32).sqrt()
}

/// Remap interleaved samples from `src_channels` to `dst_channels`.
///
/// Mapping rules:
/// - mono → stereo: duplicate channel 0
/// - stereo → mono: average L/R
/// - equal counts: pass-through
/// - other layouts: best-effort "clamp to available channels"
pub fn map_channels(samples: Vec<f32>, src_channels: u16, dst_channels: u16) -> Vec<f32> {
    let src = usize::from(src_channels.max(1));
    let dst = usize::from(dst_channels.max(1));
    if src == dst {
        return samples;
    }

    let frames = samples.len() / src;
    let mut out = Vec::with_capacity(frames * dst);
    for frame in samples.chunks_exact(src) {
        match (src, dst) {
            (2, 1) => out.push(0.5 * (frame[0] + frame[1])),
            _ => {
                for ch in 0..dst {
                    out.push(frame[ch.min(src - 1)]);
                }
            }
        }
    }
    out
}
