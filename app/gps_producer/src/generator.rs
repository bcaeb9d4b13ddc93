use fleet::location::Coordinate;
use fleet::location::LATITUDE_RANGE;
use fleet::location::LONGITUDE_RANGE;
use framework::exception::CoreRsResult;
use framework::validation_error;
use rand::Rng;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum GeneratorMode {
    /// anywhere on the globe
    Uniform,
    /// small drift around a fixed point, simulates a vehicle moving locally
    Jitter { base: Coordinate, epsilon: f64 },
}

impl Default for GeneratorMode {
    fn default() -> Self {
        GeneratorMode::Jitter {
            base: Coordinate {
                latitude: 37.7728858,
                longitude: -3.7883289,
            },
            epsilon: 0.0002,
        }
    }
}

const MAX_EPSILON: f64 = 180.0;

pub struct CoordinateGenerator {
    mode: GeneratorMode,
}

impl CoordinateGenerator {
    pub fn new(mode: GeneratorMode) -> CoreRsResult<Self> {
        if let GeneratorMode::Jitter { base, epsilon } = &mode {
            if !base.is_valid() {
                return Err(validation_error!(message = format!("jitter base out of range, base={base:?}")));
            }
            // 2 * epsilon must stay finite for random_range
            if !(0.0..=MAX_EPSILON).contains(epsilon) {
                return Err(validation_error!(
                    message = format!("jitter epsilon must be within 0..={MAX_EPSILON}, epsilon={epsilon}")
                ));
            }
        }
        Ok(Self { mode })
    }

    pub fn generate(&self) -> Coordinate {
        self.generate_with(&mut rand::rng())
    }

    pub fn generate_with<R>(&self, rng: &mut R) -> Coordinate
    where
        R: Rng + ?Sized,
    {
        match self.mode {
            GeneratorMode::Uniform => Coordinate {
                latitude: rng.random_range(LATITUDE_RANGE),
                longitude: rng.random_range(LONGITUDE_RANGE),
            },
            GeneratorMode::Jitter { base, epsilon } => Coordinate {
                latitude: (base.latitude + rng.random_range(-epsilon..=epsilon))
                    .clamp(*LATITUDE_RANGE.start(), *LATITUDE_RANGE.end()),
                longitude: (base.longitude + rng.random_range(-epsilon..=epsilon))
                    .clamp(*LONGITUDE_RANGE.start(), *LONGITUDE_RANGE.end()),
            },
        }
    }
}
