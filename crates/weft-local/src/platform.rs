// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! The local platform token.
use weft_core::Platform;

/// Name of the local platform, as used in `enabled_platforms`.
pub const LOCAL_PLATFORM_NAME: &str = "local";

/// Single-process, in-memory execution platform.
#[must_use]
pub fn local_platform() -> Platform {
    Platform::new(LOCAL_PLATFORM_NAME)
}
