//! Receiver model registry.
//!
//! Each hardware family answers `model_status.query` with a fixed
//! 14-byte code beginning `ILAFPJ -- `. Several marketing names share
//! one code; the first name in each entry is the canonical one used
//! when a model must be picked from a payload alone.

use crate::error::ParcError;

/// One receiver hardware family.
#[derive(Debug, PartialEq, Eq)]
pub struct ReceiverModel {
    /// Canonical model name.
    pub name: &'static str,
    /// Other marketing names answering with the same status payload.
    pub aliases: &'static [&'static str],
    /// Payload returned by `model_status.query`.
    pub status_payload: &'static [u8; 14],
}

impl ReceiverModel {
    /// All names for this model, canonical first.
    pub fn all_names(&self) -> impl Iterator<Item = &'static str> {
        std::iter::once(self.name).chain(self.aliases.iter().copied())
    }

    /// Comma-delimited list of all names, the friendly form of a
    /// `model_status.query` response.
    pub fn names_str(&self) -> String {
        self.all_names().collect::<Vec<_>>().join(",")
    }

    fn matches(&self, name: &str) -> bool {
        self.all_names().any(|n| {
            n.eq_ignore_ascii_case(name)
                || n.strip_prefix("DLA-")
                    .is_some_and(|short| short.eq_ignore_ascii_case(name))
        })
    }
}

/// Known models, newest first.
pub static MODELS: &[ReceiverModel] = &[
    ReceiverModel {
        name: "DLA-NZ9",
        aliases: &["DLA-NX9", "DLA-RS4100"],
        status_payload: b"ILAFPJ -- B5A1",
    },
    ReceiverModel {
        name: "DLA-NZ8",
        aliases: &["DLA-RS3100", "DLA-NX7"],
        status_payload: b"ILAFPJ -- B5A2",
    },
    ReceiverModel {
        name: "DLA-NZ7",
        aliases: &["DLA-NX5", "DLA-RS2100", "DLA-NP5"],
        status_payload: b"ILAFPJ -- B5A3",
    },
    ReceiverModel {
        name: "DLA-X90R",
        aliases: &["DLA-X70R", "DLA-RS65", "DLA-RS55"],
        status_payload: b"ILAFPJ -- -XHF",
    },
    ReceiverModel {
        name: "DLA-HD750",
        aliases: &["DLA-RS20"],
        status_payload: b"ILAFPJ -- -XH5",
    },
];

/// Default model assumed by the emulator.
pub const DEFAULT_EMULATOR_MODEL: &str = "DLA-NZ8";

/// Look a model up by any of its names, with or without the `DLA-`
/// prefix, case-insensitively.
pub fn model_by_name(name: &str) -> Result<&'static ReceiverModel, ParcError> {
    MODELS
        .iter()
        .find(|m| m.matches(name))
        .ok_or_else(|| ParcError::UnknownModel(name.to_string()))
}

/// The model a `model_status.query` payload identifies, if any.
pub fn model_for_status_payload(payload: &[u8]) -> Option<&'static ReceiverModel> {
    MODELS
        .iter()
        .find(|m| m.status_payload.as_slice() == payload)
}
