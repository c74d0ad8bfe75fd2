//! babelcast: a multilingual phase-barrier broadcast relay.
//!
//! Clients connect over TCP and each submit one message per round as
//! `<languageCode>|<text>`. The server translates each message into a single
//! configured target language where needed, tracks every client's progress
//! through an ordered set of phases, and releases one fan-out broadcast only
//! once the whole active cohort is ready — then resets that cohort for the
//! next round.

pub mod config;
pub mod connections;
pub mod protocol;
pub mod registry;
pub mod retry;
pub mod server;
pub mod status;
pub mod translation;
