use nalgebra::Vector3;

use crate::enums::Interpolation;
use crate::volume::VolumeGrid;

/// Continuous reconstruction of the discrete voxel grid.
///
/// Coordinates are normalized texture coordinates in `[0, 1]^3`; the center
/// of voxel `i` along an axis of `n` voxels sits at `(i + 0.5) / n`.
/// Coordinates outside the unit cube produce `None`, never an error; empty
/// space is an expected sampling outcome.
pub(crate) struct Sampler;

impl Sampler {
    pub(crate) fn sample(
        grid: &VolumeGrid,
        uvw: Vector3<f32>,
        kernel: Interpolation,
    ) -> Option<f32> {
        if !in_unit_cube(&uvw) {
            return None;
        }
        match kernel {
            Interpolation::Nearest => Some(Self::nearest(grid, uvw)),
            Interpolation::Trilinear => Some(Self::trilinear(grid, uvw)),
            Interpolation::Tricubic => Self::tricubic(grid, uvw),
            Interpolation::AntialiasedLinear => Self::antialiased(grid, uvw),
        }
    }

    fn nearest(grid: &VolumeGrid, uvw: Vector3<f32>) -> f32 {
        let (depth, height, width) = grid.dim();
        let x = ((uvw.x * width as f32) as usize).min(width - 1);
        let y = ((uvw.y * height as f32) as usize).min(height - 1);
        let z = ((uvw.z * depth as f32) as usize).min(depth - 1);
        grid.voxel(x, y, z)
    }

    /// Weighted blend of the 8 enclosing voxels. Exact at voxel centers.
    pub(crate) fn trilinear(grid: &VolumeGrid, uvw: Vector3<f32>) -> f32 {
        let (depth, height, width) = grid.dim();
        let (x0, x1, dx) = axis_coords(uvw.x, width);
        let (y0, y1, dy) = axis_coords(uvw.y, height);
        let (z0, z1, dz) = axis_coords(uvw.z, depth);

        let lerp = |a: f32, b: f32, t: f32| a.mul_add(1.0 - t, b * t);

        let c00 = lerp(grid.voxel(x0, y0, z0), grid.voxel(x1, y0, z0), dx);
        let c10 = lerp(grid.voxel(x0, y1, z0), grid.voxel(x1, y1, z0), dx);
        let c01 = lerp(grid.voxel(x0, y0, z1), grid.voxel(x1, y0, z1), dx);
        let c11 = lerp(grid.voxel(x0, y1, z1), grid.voxel(x1, y1, z1), dx);

        let c0 = lerp(c00, c10, dy);
        let c1 = lerp(c01, c11, dy);
        lerp(c0, c1, dz)
    }

    /// Cubic-weighted blend over the 4x4x4 neighborhood.
    ///
    /// Taps falling outside the grid are skipped and the surviving weights
    /// renormalized. This keeps the source approximation's cost profile
    /// rather than padding toward a full tricubic reconstruction.
    fn tricubic(grid: &VolumeGrid, uvw: Vector3<f32>) -> Option<f32> {
        let (depth, height, width) = grid.dim();
        let sx = uvw.x * width as f32 - 0.5;
        let sy = uvw.y * height as f32 - 0.5;
        let sz = uvw.z * depth as f32 - 0.5;
        let (bx, by, bz) = (sx.floor(), sy.floor(), sz.floor());
        let (fx, fy, fz) = (sx - bx, sy - by, sz - bz);

        let mut accum = 0.0f32;
        let mut weight_sum = 0.0f32;
        for oz in -1i32..=2 {
            let z = bz as i32 + oz;
            if z < 0 || z >= depth as i32 {
                continue;
            }
            let wz = cubic_weight(oz as f32 - fz);
            for oy in -1i32..=2 {
                let y = by as i32 + oy;
                if y < 0 || y >= height as i32 {
                    continue;
                }
                let wy = cubic_weight(oy as f32 - fy);
                for ox in -1i32..=2 {
                    let x = bx as i32 + ox;
                    if x < 0 || x >= width as i32 {
                        continue;
                    }
                    let w = cubic_weight(ox as f32 - fx) * wy * wz;
                    accum += grid.voxel(x as usize, y as usize, z as usize) * w;
                    weight_sum += w;
                }
            }
        }

        (weight_sum.abs() > f32::EPSILON).then(|| accum / weight_sum)
    }

    /// 4x4 sub-voxel grid of trilinear taps in the xy texture axes,
    /// averaged. Taps that leave the volume are excluded.
    fn antialiased(grid: &VolumeGrid, uvw: Vector3<f32>) -> Option<f32> {
        const GRID: u32 = 4;
        let (_, height, width) = grid.dim();
        let texel = Vector3::new(1.0 / width as f32, 1.0 / height as f32, 0.0);

        let mut accum = 0.0f32;
        let mut taps = 0u32;
        for j in 0..GRID {
            for i in 0..GRID {
                let ox = (i as f32 + 0.5) / GRID as f32 - 0.5;
                let oy = (j as f32 + 0.5) / GRID as f32 - 0.5;
                let at = uvw + Vector3::new(ox * texel.x, oy * texel.y, 0.0);
                if in_unit_cube(&at) {
                    accum += Self::trilinear(grid, at);
                    taps += 1;
                }
            }
        }

        (taps > 0).then(|| accum / taps as f32)
    }
}

#[inline]
fn in_unit_cube(uvw: &Vector3<f32>) -> bool {
    (0.0..=1.0).contains(&uvw.x) && (0.0..=1.0).contains(&uvw.y) && (0.0..=1.0).contains(&uvw.z)
}

/// Map a normalized coordinate to clamped lattice neighbors and the
/// fractional blend factor, with the half-voxel center offset.
#[inline]
fn axis_coords(u: f32, n: usize) -> (usize, usize, f32) {
    let s = (u * n as f32 - 0.5).clamp(0.0, (n - 1) as f32);
    let i0 = s.floor() as usize;
    let i1 = (i0 + 1).min(n - 1);
    (i0, i1, s - i0 as f32)
}

/// Catmull-Rom cubic basis.
#[inline]
fn cubic_weight(t: f32) -> f32 {
    let t = t.abs();
    if t <= 1.0 {
        ((1.5 * t - 2.5) * t) * t + 1.0
    } else if t < 2.0 {
        ((-0.5 * t + 2.5) * t - 4.0) * t + 2.0
    } else {
        0.0
    }
}
