use serde::{Deserialize, Serialize};

use crate::{
    floating_type_mod::{FT, PI},
    VI,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum KernelType {
    WendlandC2,
    CubicSpline,
}

impl Default for KernelType {
    fn default() -> Self {
        KernelType::WendlandC2
    }
}

/**
 * Wendland C2 profile with q = r/h and support 2h. It is 1 at q=0.
 */
pub fn wendland_c2_unnormalized(q: FT) -> FT {
    if q < 2. {
        let v = 1. - 0.5 * q;
        v * v * v * v * (1. + 2. * q)
    } else {
        0.
    }
}

pub fn wendland_c2_unnormalized_deriv(q: FT) -> FT {
    if q < 2. {
        let v = 1. - 0.5 * q;
        -5. * q * v * v * v
    } else {
        0.
    }
}

/**
 * Cubic B-spline profile in terms of x = r/(2h). It is 1 at x=0.
 */
pub fn cubic_kernel_unnormalized(q: FT) -> FT {
    if q < 0.5 {
        return 6. * (q * q * q - q * q) + 1.;
    } else if q < 1. {
        let v = 1. - q;
        return 2. * (v * v * v);
    } else {
        return 0.;
    }
}

pub fn cubic_kernel_unnormalized_deriv(q: FT) -> FT {
    if q < 0.5 {
        return 18. * q * q - 12. * q;
    } else if q < 1. {
        let v = 1. - q;
        return -6. * v * v;
    } else {
        return 0.;
    };
}

/// Kernel function with a fixed smoothing length. It is owned by the resolution model and
/// replaced whenever the smoothing length changes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Kernel {
    kernel_type: KernelType,
    h: FT,
}

impl Kernel {
    pub fn new(kernel_type: KernelType, h: FT) -> Kernel {
        Kernel { kernel_type, h }
    }

    pub fn kernel_type(&self) -> KernelType {
        self.kernel_type
    }

    pub fn smoothing_length(&self) -> FT {
        self.h
    }

    /// Support radius in units of the smoothing length.
    pub fn kernel_size(&self) -> FT {
        2.
    }

    pub fn cutoff_radius(&self) -> FT {
        self.kernel_size() * self.h
    }

    /// Unnormalized one dimensional profile evaluated at q = r/h.
    pub fn w_1d(&self, q: FT) -> FT {
        match self.kernel_type {
            KernelType::WendlandC2 => wendland_c2_unnormalized(q),
            KernelType::CubicSpline => cubic_kernel_unnormalized(0.5 * q),
        }
    }

    fn dw_1d(&self, q: FT) -> FT {
        match self.kernel_type {
            KernelType::WendlandC2 => wendland_c2_unnormalized_deriv(q),
            KernelType::CubicSpline => 0.5 * cubic_kernel_unnormalized_deriv(0.5 * q),
        }
    }

    /**
     * r is the distance to the center.
     */
    pub fn w<DU: DimensionUtils<D>, const D: usize>(&self, r: FT) -> FT {
        DU::kernel_normalization(self.kernel_type, self.h) * self.w_1d(r / self.h)
    }

    /**
     * Derivative dW/dr.
     */
    pub fn dw<DU: DimensionUtils<D>, const D: usize>(&self, r: FT) -> FT {
        DU::kernel_normalization(self.kernel_type, self.h) * self.dw_1d(r / self.h) / self.h
    }

    /// Kernel value for a particle whose smoothing length is `h / h_ratio`.
    pub fn w_scaled<DU: DimensionUtils<D>, const D: usize>(&self, h_ratio: FT, r: FT) -> FT {
        h_ratio.powi(D as i32) * self.w::<DU, D>(r * h_ratio)
    }

    pub fn dw_scaled<DU: DimensionUtils<D>, const D: usize>(&self, h_ratio: FT, r: FT) -> FT {
        h_ratio.powi(D as i32 + 1) * self.dw::<DU, D>(r * h_ratio)
    }
}

// Sync is needed since we use this trait inside parallel iterators
pub trait DimensionUtils<const D: usize>: Sync {
    fn iterate_grid_neighbors(dist: i32, f: impl FnMut(VI<D>));

    fn kernel_normalization(kernel_type: KernelType, h: FT) -> FT;
}

#[derive(Debug, Clone, Copy)]
pub enum DimensionUtils2d {}
impl DimensionUtils<2> for DimensionUtils2d {
    fn iterate_grid_neighbors(dist: i32, mut f: impl FnMut(VI<2>)) {
        for y in -dist..=dist {
            for x in -dist..=dist {
                f([x, y].into());
            }
        }
    }

    fn kernel_normalization(kernel_type: KernelType, h: FT) -> FT {
        match kernel_type {
            KernelType::WendlandC2 => 7. / (4. * PI * h * h),
            KernelType::CubicSpline => 10. / (7. * PI * (h * h)),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub enum DimensionUtils3d {}
impl DimensionUtils<3> for DimensionUtils3d {
    fn iterate_grid_neighbors(dist: i32, mut f: impl FnMut(VI<3>)) {
        for z in -dist..=dist {
            for y in -dist..=dist {
                for x in -dist..=dist {
                    f([x, y, z].into());
                }
            }
        }
    }

    fn kernel_normalization(kernel_type: KernelType, h: FT) -> FT {
        match kernel_type {
            KernelType::WendlandC2 => 21. / (16. * PI * h * h * h),
            KernelType::CubicSpline => 1. / (PI * (h * h * h)),
        }
    }
}

#[test]
fn kernel_2d_integration_test() {
    use crate::vec2f;

    for kernel_type in [KernelType::WendlandC2, KernelType::CubicSpline] {
        let kernel = Kernel::new(kernel_type, 5.);
        let support_radius = kernel.cutoff_radius();
        let grid_size = 200;
        let square_len = 2. * support_radius / grid_size as FT;
        let square_area = square_len * square_len;

        let mut integral = 0.;

        for y in 0..grid_size {
            for x in 0..grid_size {
                let integration_point = vec2f(
                    (x as FT + 0.5) * square_len - support_radius,
                    (y as FT + 0.5) * square_len - support_radius,
                );
                integral += kernel.w::<DimensionUtils2d, 2>(integration_point.norm()) * square_area;
            }
        }

        println!("Integration of 2D {:?} kernel: {}", kernel_type, integral);
        crate::assert_ft_approx_eq(integral, 1.0, 0.001, || format!("{:?} kernel integral", kernel_type));
    }
}

#[test]
fn kernel_3d_integration_test() {
    use crate::vec3f;

    for kernel_type in [KernelType::WendlandC2, KernelType::CubicSpline] {
        let kernel = Kernel::new(kernel_type, 1.);
        let support_radius = kernel.cutoff_radius();
        let grid_size = 40;
        let cube_len = 2. * support_radius / grid_size as FT;
        let cube_volume = cube_len * cube_len * cube_len;

        let mut integral = 0.;
        for z in 0..grid_size {
            for y in 0..grid_size {
                for x in 0..grid_size {
                    let p = vec3f(
                        (x as FT + 0.5) * cube_len - support_radius,
                        (y as FT + 0.5) * cube_len - support_radius,
                        (z as FT + 0.5) * cube_len - support_radius,
                    );
                    integral += kernel.w::<DimensionUtils3d, 3>(p.norm()) * cube_volume;
                }
            }
        }

        crate::assert_ft_approx_eq(integral, 1.0, 0.01, || format!("{:?} kernel integral", kernel_type));
    }
}

#[test]
fn kernel_derivative_test() {
    for kernel_type in [KernelType::WendlandC2, KernelType::CubicSpline] {
        let kernel = Kernel::new(kernel_type, 0.5);
        let diff = 1.0e-3;
        let mut r = 0.05;
        while r < kernel.cutoff_radius() - diff {
            let analytical = kernel.dw::<DimensionUtils2d, 2>(r);
            let approx = (kernel.w::<DimensionUtils2d, 2>(r + 0.5 * diff)
                - kernel.w::<DimensionUtils2d, 2>(r - 0.5 * diff))
                / diff;
            assert!(
                (analytical - approx).abs() < 0.01,
                "{:?} at r={}: analytical={} approx={}",
                kernel_type,
                r,
                analytical,
                approx
            );
            r += 0.05;
        }
    }
}

#[test]
fn kernel_profile_is_one_at_center_and_zero_at_cutoff() {
    for kernel_type in [KernelType::WendlandC2, KernelType::CubicSpline] {
        let kernel = Kernel::new(kernel_type, 0.3);
        assert_eq!(kernel.w_1d(0.), 1.);
        assert_eq!(kernel.w_1d(kernel.kernel_size()), 0.);
        assert!(kernel.w_1d(0.5) > kernel.w_1d(1.0));
    }
}

#[test]
fn scaled_kernel_matches_kernel_with_smaller_smoothing_length() {
    let kernel = Kernel::new(KernelType::WendlandC2, 1.);
    let fine = Kernel::new(KernelType::WendlandC2, 0.5);
    for r in [0., 0.2, 0.5, 0.9] {
        crate::assert_ft_approx_eq(
            kernel.w_scaled::<DimensionUtils2d, 2>(2., r),
            fine.w::<DimensionUtils2d, 2>(r),
            1.0e-4,
            || format!("scaled kernel at r={}", r),
        );
        crate::assert_ft_approx_eq(
            kernel.dw_scaled::<DimensionUtils3d, 3>(2., r),
            fine.dw::<DimensionUtils3d, 3>(r),
            1.0e-4,
            || format!("scaled kernel derivative at r={}", r),
        );
    }
}
