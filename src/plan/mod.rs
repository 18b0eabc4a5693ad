// Motion plan translation for the drive base
//
// Provides:
// - Distance-bucketed velocity lookup per gear and steering
// - Primitive filtering and command construction (velocity + duration)

pub mod translator;
pub mod velocity;

pub use translator::{translate, TranslateError, Translator, ZERO_DISTANCE_TOLERANCE};
pub use velocity::{DistanceClass, VelocityPolicy};
