pub mod conv;
pub mod mbconv;
pub mod squeeze_excitation;

pub use conv::Conv;
pub use mbconv::{BlockPlan, BlockSpec, FeatureShape, MbConvBlock};
pub use squeeze_excitation::SqueezeExcitation;
