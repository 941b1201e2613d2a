//! Domain value objects.

mod access_token;
mod sentiment;
mod subscription_tier;

pub use access_token::AccessToken;
pub use sentiment::{Sentiment, SentimentTally};
pub use subscription_tier::SubscriptionTier;
