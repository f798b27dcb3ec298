// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Data models for the application.

pub mod contact;
pub mod email;
pub mod follow_up;
pub mod user;

pub use contact::Contact;
pub use email::{Email, NewEmail};
pub use follow_up::{FollowUp, NewFollowUp};
pub use user::{User, UserProfile};
