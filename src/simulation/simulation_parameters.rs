use crate::{
    bounding_box::BoundingBox,
    error::{check_positive, SphError},
    floating_type_mod::FT,
    sdf::{Sdf, SdfBall, SdfBox, SdfPolygon},
    sph_kernels::KernelType,
    vec2f, EPS, VF,
};
use serde::{Deserialize, Serialize};

#[derive(PartialEq, Eq, Debug, Clone, Copy, Serialize, Deserialize)]
pub enum RefinementMethod {
    Uniform,
    // halving the spacing per level, the smoothing length ratio is chosen by the caller
    Local,
    // needs `refinement_shape` in the scene
    NearSurface,
    WithinShape,
    SplitAndMerge,
}

impl Default for RefinementMethod {
    fn default() -> Self {
        RefinementMethod::Uniform
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationParams {
    // spacing of the whole system, the body spacing is `resolution_ref / system_refinement_ratio`
    pub resolution_ref: FT,
    pub h_spacing_ratio: FT,
    pub system_refinement_ratio: FT,
    pub kernel: KernelType,

    pub refinement: RefinementMethod,
    // ignored for `Uniform`
    pub local_refinement_level: usize,

    // ratio between the body spacing and the level set spacing
    pub level_set_refinement_ratio: FT,
}

impl Default for SimulationParams {
    fn default() -> Self {
        SimulationParams {
            resolution_ref: 0.1,
            h_spacing_ratio: 1.3,
            system_refinement_ratio: 1.0,
            kernel: KernelType::default(),
            refinement: RefinementMethod::default(),
            local_refinement_level: 0,
            level_set_refinement_ratio: 1.0,
        }
    }
}

fn to_vector<const D: usize>(name: &'static str, v: &[FT]) -> Result<VF<D>, SphError> {
    if v.len() != D {
        return Err(SphError::DimensionMismatch {
            name,
            expected: D,
            got: v.len(),
        });
    }
    Ok(VF::<D>::from_column_slice(v))
}

/// Analytic target shape as written in the scene file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ShapeConfig {
    Ball { center: Vec<FT>, radius: FT },
    Box { lower: Vec<FT>, upper: Vec<FT> },
    // counter clockwise, only in 2d
    Polygon { points: Vec<[FT; 2]> },
}

impl ShapeConfig {
    pub fn to_sdf<const D: usize>(&self) -> Result<Sdf<D>, SphError> {
        match self {
            ShapeConfig::Ball { center, radius } => Ok(SdfBall::new(
                to_vector::<D>("ball center", center)?,
                check_positive("ball radius", *radius)?,
            )
            .into()),
            ShapeConfig::Box { lower, upper } => {
                Ok(SdfBox::new(to_vector::<D>("box lower", lower)?, to_vector::<D>("box upper", upper)?).into())
            }
            ShapeConfig::Polygon { points } => {
                if D != 2 {
                    return Err(SphError::DimensionMismatch {
                        name: "polygon",
                        expected: D,
                        got: 2,
                    });
                }
                if points.len() < 3 {
                    return Err(SphError::InvalidParameter {
                        name: "polygon corners",
                        value: points.len() as FT,
                    });
                }
                let points: Vec<_> = points.iter().map(|p| vec2f(p[0], p[1])).collect();
                Ok(Sdf::Polygon(SdfPolygon::from_points(&points)))
            }
        }
    }
}

/// Box shaped region that is filled with particles on a regular lattice.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BodyConfig {
    pub name: String,
    pub pos: Vec<FT>,
    pub size: Vec<FT>,
    // the spacing of the resolution model if missing
    #[serde(default)]
    pub spacing: Option<FT>,
}

impl BodyConfig {
    /// Lattice positions in cell centers, the volume of each particle is `spacing^D`.
    pub fn lattice_positions<const D: usize>(&self, default_spacing: FT) -> Result<Vec<VF<D>>, SphError> {
        let spacing = check_positive("body spacing", self.spacing.unwrap_or(default_spacing))?;
        let pos = to_vector::<D>("body pos", &self.pos)?;
        let size = to_vector::<D>("body size", &self.size)?;

        let counts: Vec<usize> = size.iter().map(|s| (s / spacing + EPS).floor().max(0.) as usize).collect();
        let total: usize = counts.iter().product();

        let mut positions = Vec::with_capacity(total);
        for linear in 0..total {
            let mut rest = linear;
            let mut p = pos;
            for d in 0..D {
                let idx = rest % counts[d];
                rest /= counts[d];
                p[d] += (idx as FT + 0.5) * spacing;
            }
            positions.push(p);
        }
        Ok(positions)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SceneConfig {
    pub domain_lower: Vec<FT>,
    pub domain_upper: Vec<FT>,
    #[serde(default)]
    pub refinement_shape: Option<ShapeConfig>,
    // the first body is refined, all others are contact bodies
    pub bodies: Vec<BodyConfig>,
}

impl SceneConfig {
    pub fn domain_bounds<const D: usize>(&self) -> Result<BoundingBox<D>, SphError> {
        Ok(BoundingBox::new(
            to_vector::<D>("domain lower", &self.domain_lower)?,
            to_vector::<D>("domain upper", &self.domain_upper)?,
        ))
    }

    pub fn target_shape<const D: usize>(&self) -> Result<Option<Sdf<D>>, SphError> {
        self.refinement_shape.as_ref().map(|shape| shape.to_sdf::<D>()).transpose()
    }
}

#[test]
fn simulation_params_defaults_from_yaml() {
    let params: SimulationParams = serde_yaml::from_str("resolution_ref: 0.05\nrefinement: WithinShape\n").unwrap();
    assert_eq!(params.resolution_ref, 0.05);
    assert_eq!(params.h_spacing_ratio, 1.3);
    assert_eq!(params.system_refinement_ratio, 1.0);
    assert_eq!(params.kernel, KernelType::WendlandC2);
    assert_eq!(params.refinement, RefinementMethod::WithinShape);
    assert_eq!(params.local_refinement_level, 0);
}

#[test]
fn scene_config_from_yaml() {
    let yaml = "
domain_lower: [0.0, 0.0]
domain_upper: [2.0, 1.0]
refinement_shape:
  type: Ball
  center: [1.0, 0.5]
  radius: 0.25
bodies:
  - name: water
    pos: [0.0, 0.0]
    size: [1.0, 0.5]
  - name: wall
    pos: [1.5, 0.0]
    size: [0.2, 1.0]
    spacing: 0.05
";
    let scene: SceneConfig = serde_yaml::from_str(yaml).unwrap();
    let bounds = scene.domain_bounds::<2>().unwrap();
    assert_eq!(bounds.upper, vec2f(2., 1.));

    let shape = scene.target_shape::<2>().unwrap().unwrap();
    assert!(shape.signed_distance(vec2f(1., 0.5)) < 0.);
    assert!(matches!(
        scene.target_shape::<3>(),
        Err(SphError::DimensionMismatch { expected: 3, got: 2, .. })
    ));

    let water = scene.bodies[0].lattice_positions::<2>(0.1).unwrap();
    assert_eq!(water.len(), 50);
    crate::assert_ft_approx_eq(water[0].x, 0.05, 1e-6, || "first lattice point".into());
    assert!(water.iter().all(|p| p.x < 1. && p.y < 0.5));

    let wall = scene.bodies[1].lattice_positions::<2>(0.1).unwrap();
    assert_eq!(wall.len(), 4 * 20);
}

#[test]
fn polygon_is_two_dimensional() {
    let polygon = ShapeConfig::Polygon {
        points: vec![[0., 0.], [1., 0.], [1., 1.], [0., 1.]],
    };
    assert!(polygon.to_sdf::<2>().is_ok());
    assert!(matches!(
        polygon.to_sdf::<3>(),
        Err(SphError::DimensionMismatch { name: "polygon", .. })
    ));
}
