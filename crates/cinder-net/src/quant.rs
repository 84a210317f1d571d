//! Lossy scalar codecs for break payloads.
//!
//! Positions quantize onto a grid over the world bounds; the grid cell
//! decides the bit width, so a bigger world costs more bits rather than
//! precision. Two cell sizes are used: coarse for identifier centers
//! (resolution tolerates meters of error) and fine for impact points
//! (fracture is sensitive to millimeters).

use glam::Vec3;
use serde::{Deserialize, Serialize};

/// Grid cell for identifier centers.
pub const COARSE_SAMPLE_M: f32 = 2.0;
/// Grid cell for impact points and cut geometry.
pub const FINE_SAMPLE_M: f32 = 0.005;

/// World bounds the quantizer maps onto.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QuantParams {
    /// World extent in meters per axis.
    pub max_world_size: f32,
    /// Subtracted from x/y before quantization, added back after.
    pub offset: Vec3,
}

impl Default for QuantParams {
    fn default() -> Self {
        Self {
            max_world_size: 4096.0,
            offset: Vec3::ZERO,
        }
    }
}

impl QuantParams {
    /// Bits per axis for the given cell size: `ceil(log2(range / cell))`.
    pub fn bits_per_axis(&self, cell: f32) -> u32 {
        let steps = (self.max_world_size / cell).max(1.0);
        (steps.log2().ceil()) as u32
    }

    fn quantize_axis(&self, v: f32, cell: f32) -> u32 {
        let max_step = (self.max_world_size / cell) as u32;
        let step = (v / cell).round();
        (step.max(0.0) as u32).min(max_step)
    }

    /// Quantize a world position onto the grid with the given cell size.
    pub fn encode_pos(&self, pos: Vec3, cell: f32) -> [u32; 3] {
        let local = pos - self.offset;
        [
            self.quantize_axis(local.x, cell),
            self.quantize_axis(local.y, cell),
            self.quantize_axis(local.z, cell),
        ]
    }

    pub fn decode_pos(&self, q: [u32; 3], cell: f32) -> Vec3 {
        Vec3::new(q[0] as f32 * cell, q[1] as f32 * cell, q[2] as f32 * cell) + self.offset
    }
}

/// Unit direction as 8-bit yaw and pitch.
pub fn encode_dir(dir: Vec3) -> (u8, u8) {
    let d = dir.normalize_or_zero();
    let yaw = d.y.atan2(d.x); // [-pi, pi]
    let pitch = d.z.clamp(-1.0, 1.0).asin(); // [-pi/2, pi/2]
    let qy = ((yaw + std::f32::consts::PI) / std::f32::consts::TAU * 255.0).round() as u8;
    let qp = ((pitch + std::f32::consts::FRAC_PI_2) / std::f32::consts::PI * 255.0).round() as u8;
    (qy, qp)
}

pub fn decode_dir(yaw: u8, pitch: u8) -> Vec3 {
    let yaw = yaw as f32 / 255.0 * std::f32::consts::TAU - std::f32::consts::PI;
    let pitch = pitch as f32 / 255.0 * std::f32::consts::PI - std::f32::consts::FRAC_PI_2;
    Vec3::new(
        yaw.cos() * pitch.cos(),
        yaw.sin() * pitch.cos(),
        pitch.sin(),
    )
}

/// Truncated float: keep the upper 16 bits (sign, exponent, top mantissa).
/// Good to about 0.4% relative error, plenty for impact energies.
pub fn encode_f16(v: f32) -> u16 {
    (v.to_bits() >> 16) as u16
}

pub fn decode_f16(q: u16) -> f32 {
    f32::from_bits((q as u32) << 16)
}

/// Impactor mass on a log scale over [1, 1000] kg.
pub fn encode_mass(mass: f32) -> u8 {
    let m = mass.clamp(1.0, 1000.0);
    (m.ln() / 1000f32.ln() * 255.0).round() as u8
}

pub fn decode_mass(q: u8) -> f32 {
    (q as f32 / 255.0 * 1000f32.ln()).exp()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bits_per_axis_scales_with_world() {
        let params = QuantParams {
            max_world_size: 4096.0,
            offset: Vec3::ZERO,
        };
        // 4096 / 2.0 = 2048 steps -> 11 bits
        assert_eq!(params.bits_per_axis(COARSE_SAMPLE_M), 11);
        // 4096 / 0.005 = 819200 steps -> 20 bits
        assert_eq!(params.bits_per_axis(FINE_SAMPLE_M), 20);
    }

    #[test]
    fn test_fine_position_roundtrip_within_cell() {
        let params = QuantParams::default();
        let pos = Vec3::new(123.4567, 89.0123, 45.6789);
        let q = params.encode_pos(pos, FINE_SAMPLE_M);
        let back = params.decode_pos(q, FINE_SAMPLE_M);
        assert!((back - pos).length() <= FINE_SAMPLE_M);
    }

    #[test]
    fn test_coarse_position_roundtrip_within_cell() {
        let params = QuantParams::default();
        let pos = Vec3::new(1000.3, 2000.7, 30.2);
        let q = params.encode_pos(pos, COARSE_SAMPLE_M);
        let back = params.decode_pos(q, COARSE_SAMPLE_M);
        assert!((back - pos).length() <= COARSE_SAMPLE_M);
    }

    #[test]
    fn test_world_offset_applied_symmetrically() {
        let params = QuantParams {
            max_world_size: 1024.0,
            offset: Vec3::new(-512.0, -512.0, 0.0),
        };
        let pos = Vec3::new(-100.0, 250.0, 10.0);
        let q = params.encode_pos(pos, COARSE_SAMPLE_M);
        let back = params.decode_pos(q, COARSE_SAMPLE_M);
        assert!((back - pos).length() <= COARSE_SAMPLE_M * 1.74);
    }

    #[test]
    fn test_out_of_range_position_clamps() {
        let params = QuantParams {
            max_world_size: 100.0,
            offset: Vec3::ZERO,
        };
        let q = params.encode_pos(Vec3::new(-50.0, 500.0, 50.0), COARSE_SAMPLE_M);
        assert_eq!(q[0], 0);
        assert_eq!(q[1], 50);
    }

    #[test]
    fn test_direction_roundtrip() {
        for dir in [
            Vec3::X,
            Vec3::NEG_Y,
            Vec3::Z,
            Vec3::new(1.0, 1.0, 1.0).normalize(),
            Vec3::new(-0.3, 0.8, -0.5).normalize(),
        ] {
            let (y, p) = encode_dir(dir);
            let back = decode_dir(y, p);
            assert!(
                back.dot(dir) > 0.995,
                "direction {dir:?} decoded too far off: {back:?}"
            );
        }
    }

    #[test]
    fn test_truncated_float_roundtrip() {
        for v in [0.0f32, 1.0, 950.5, 123456.0, -42.25] {
            let back = decode_f16(encode_f16(v));
            let err = (back - v).abs();
            assert!(err <= v.abs() * 0.005, "value {v} came back as {back}");
        }
    }

    #[test]
    fn test_mass_clamped_log_roundtrip() {
        for m in [1.0f32, 10.0, 80.0, 999.0] {
            let back = decode_mass(encode_mass(m));
            assert!((back - m).abs() <= m * 0.03, "mass {m} came back as {back}");
        }
        // Out-of-range clamps rather than wraps
        assert_eq!(encode_mass(0.1), encode_mass(1.0));
        assert_eq!(encode_mass(5000.0), encode_mass(1000.0));
    }
}
