//! HTTP gateway for the Dossier engine: run start/poll/stream endpoints,
//! follow-up chat, regeneration, and the auth front.

pub mod api;
pub mod auth;
pub mod state;
