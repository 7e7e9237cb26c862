pub mod candle;
pub mod hub;

pub use candle::CanonicalCandle;
pub use hub::{CandleHub, SubscriberFilter, SubscriberId};
