//! Access control: who may administer the bot and who may receive content.

mod gate;
mod roster;

pub use gate::SubscriptionGate;
pub use roster::{AccessError, AccessRoster, AdminRemoval, normalize_channel};
