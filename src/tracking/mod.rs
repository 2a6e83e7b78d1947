mod replay;
mod sampler;
mod simulated;
mod source;

pub use replay::ReplaySource;
pub use sampler::{Sampler, SamplerEvent, Subscription, SubscriptionId, FIX_TIMEOUT};
pub use simulated::SimulatedSource;
pub use source::{Accuracy, FixError, PositionSource, Source};
