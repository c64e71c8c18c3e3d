//! Static command catalog.
//!
//! Commands are organized in groups sharing a 2-byte command code and a
//! group prefix; each command adds its own prefix. The concatenation
//! `code + group prefix + command prefix` is the wire identity of a
//! command. Identical wire bytes may be claimed by more than one
//! command (remote-control overloads differ per receiver model);
//! resolution returns every candidate in declaration order and ranking
//! picks model match over declaration order.
//!
//! Advanced groups additionally declare the fixed payload length of
//! their data response and a mapper between payloads and friendly
//! strings.

use std::collections::HashMap;
use std::sync::LazyLock;

use crate::error::ParcError;
use crate::protocol::model::{ReceiverModel, model_by_name, model_for_status_payload, MODELS};
use crate::protocol::packet::{Packet, PacketType};

// ── Response mappers ─────────────────────────────────────────────

/// Maps a fixed-length response payload to a friendly string and back.
#[derive(Debug, Clone, Copy)]
pub enum ResponseMapper {
    /// Basic commands: no data response.
    None,
    /// An enumerated set of valid payloads.
    FixedMap(&'static [(&'static [u8], &'static str)]),
    /// Any payload of the declared length; friendly form is lossy UTF-8.
    PassThrough,
    /// `model_status.query`: payload identifies a model family.
    ModelCode,
    /// `firmware_version_status.query`: 6 bytes, "MM-mmm" documented,
    /// dashless with trailing blanks on some receivers (NZ8).
    FirmwareVersion,
}

impl ResponseMapper {
    /// Friendly string for a payload, or `None` if the payload is not
    /// in this mapper's valid set.
    pub fn payload_to_str(&self, payload: &[u8]) -> Option<String> {
        match self {
            ResponseMapper::None => None,
            ResponseMapper::FixedMap(entries) => entries
                .iter()
                .find(|(p, _)| *p == payload)
                .map(|(_, s)| (*s).to_string()),
            ResponseMapper::PassThrough => {
                Some(String::from_utf8_lossy(payload).trim_end().to_string())
            }
            ResponseMapper::ModelCode => {
                model_for_status_payload(payload).map(|m| m.names_str())
            }
            ResponseMapper::FirmwareVersion => firmware_payload_to_version(payload),
        }
    }

    /// Payload for a friendly string, or `None` if the string is not
    /// recognized. Always produces the canonical wire form.
    pub fn str_to_payload(&self, value: &str) -> Option<Vec<u8>> {
        match self {
            ResponseMapper::None => None,
            ResponseMapper::FixedMap(entries) => entries
                .iter()
                .find(|(_, s)| *s == value)
                .map(|(p, _)| p.to_vec()),
            ResponseMapper::PassThrough => Some(value.as_bytes().to_vec()),
            ResponseMapper::ModelCode => model_by_name(value)
                .ok()
                .map(|m| m.status_payload.to_vec()),
            ResponseMapper::FirmwareVersion => firmware_version_to_payload(value),
        }
    }

    /// The enumerated valid payloads, sorted lexicographically, when
    /// this mapper has a closed set.
    pub fn known_payloads(&self) -> Option<Vec<&'static [u8]>> {
        match self {
            ResponseMapper::FixedMap(entries) => {
                let mut payloads: Vec<&'static [u8]> = entries.iter().map(|(p, _)| *p).collect();
                payloads.sort();
                Some(payloads)
            }
            ResponseMapper::ModelCode => {
                let mut payloads: Vec<&'static [u8]> =
                    MODELS.iter().map(|m| m.status_payload.as_slice()).collect();
                payloads.sort();
                Some(payloads)
            }
            _ => None,
        }
    }
}

/// Parse a firmware version payload into "major.minor" form
/// (minor zero-padded to three digits).
fn firmware_payload_to_version(payload: &[u8]) -> Option<String> {
    if payload.len() != 6 {
        return None;
    }
    let text = std::str::from_utf8(payload).ok()?;
    let (major, minor): (u32, u32) = if let Some((maj, min)) = text.split_once('-') {
        if maj.len() != 2 || min.len() != 3 {
            return None;
        }
        (maj.parse().ok()?, min.parse().ok()?)
    } else {
        let trimmed = text.trim_end();
        if trimmed.contains('.') || trimmed.is_empty() {
            return None;
        }
        if trimmed.len() <= 2 {
            (trimmed.parse().ok()?, 0)
        } else {
            (trimmed[..2].parse().ok()?, trimmed[2..].parse().ok()?)
        }
    };
    Some(format!("{major}.{minor:03}"))
}

/// Encode "major.minor" as the canonical "MM-mmm" wire form.
fn firmware_version_to_payload(version: &str) -> Option<Vec<u8>> {
    let (major, minor): (u32, u32) = match version.split_once('.') {
        Some((maj, min)) => (maj.parse().ok()?, min.parse().ok()?),
        None => (version.parse().ok()?, 0),
    };
    if major > 99 || minor > 999 {
        return None;
    }
    Some(format!("{major:02}-{minor:03}").into_bytes())
}

// ── Catalog data structures ──────────────────────────────────────

/// A family of commands sharing a command code and group prefix.
#[derive(Debug)]
pub struct CommandGroup {
    pub name: &'static str,
    pub code: [u8; 2],
    pub group_prefix: &'static [u8],
    pub is_advanced: bool,
    /// Fixed length of the advanced response payload; 0 for basic groups.
    pub response_payload_length: usize,
    /// Models this group applies to; `None` means all.
    pub models: Option<&'static [&'static str]>,
    pub commands: &'static [CommandSpec],
}

/// One command within a group.
#[derive(Debug)]
pub struct CommandSpec {
    pub name: &'static str,
    /// Additional prefix following the group prefix.
    pub prefix: &'static [u8],
    pub description: &'static str,
    pub mapper: ResponseMapper,
    /// Models this command applies to; `None` inherits the group's set.
    pub models: Option<&'static [&'static str]>,
}

/// A resolved (group, command) pair, the unit everything else works with.
#[derive(Debug, Clone, Copy)]
pub struct CommandMeta {
    pub group: &'static CommandGroup,
    pub spec: &'static CommandSpec,
}

impl PartialEq for CommandMeta {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self.group, other.group) && std::ptr::eq(self.spec, other.spec)
    }
}
impl Eq for CommandMeta {}

impl CommandMeta {
    /// The full command name, `"{group}.{name}"`.
    pub fn full_name(&self) -> String {
        format!("{}.{}", self.group.name, self.spec.name)
    }

    pub fn command_code(&self) -> [u8; 2] {
        self.group.code
    }

    pub fn is_advanced(&self) -> bool {
        self.group.is_advanced
    }

    pub fn packet_type(&self) -> PacketType {
        if self.is_advanced() {
            PacketType::AdvancedCommand
        } else {
            PacketType::BasicCommand
        }
    }

    /// Group prefix + command prefix; the packet payload of this command.
    pub fn command_prefix(&self) -> Vec<u8> {
        let mut prefix = self.group.group_prefix.to_vec();
        prefix.extend_from_slice(self.spec.prefix);
        prefix
    }

    pub fn response_payload_length(&self) -> usize {
        self.group.response_payload_length
    }

    pub fn mapper(&self) -> &ResponseMapper {
        &self.spec.mapper
    }

    /// The model restriction in effect: the command's own, else the
    /// group's, else none.
    pub fn model_names(&self) -> Option<&'static [&'static str]> {
        self.spec.models.or(self.group.models)
    }

    /// Whether this command applies to the given model.
    pub fn applies_to(&self, model: &ReceiverModel) -> bool {
        match self.model_names() {
            None => true,
            Some(names) => names
                .iter()
                .any(|n| model_by_name(n).is_ok_and(|m| std::ptr::eq(m, model))),
        }
    }

    /// Synthesize the command packet for this command.
    pub fn command_packet(&self) -> Result<Packet, ParcError> {
        Packet::synthesize(self.packet_type(), self.command_code(), &self.command_prefix())
    }
}

// ── The catalog ──────────────────────────────────────────────────

const POWER_STATUS_MAP: &[(&[u8], &str)] = &[
    (b"\x30", "Standby"),
    (b"\x31", "On"),
    (b"\x32", "Cooling"),
    // Not documented; determined empirically.
    (b"\x33", "Warming"),
    (b"\x34", "Emergency"),
];

const INPUT_STATUS_MAP: &[(&[u8], &str)] = &[
    (b"\x30", "S-Video"),
    (b"\x31", "Video"),
    (b"\x32", "Component"),
    (b"\x33", "PC"),
    (b"\x36", "HDMI 1"),
    (b"\x37", "HDMI 2"),
];

const GAMMA_TABLE_STATUS_MAP: &[(&[u8], &str)] = &[
    (b"\x30", "Normal"),
    (b"\x31", "A"),
    (b"\x32", "B"),
    (b"\x33", "C"),
    (b"\x34", "Custom 1"),
    (b"\x35", "Custom 2"),
    (b"\x36", "Custom 3"),
];

const GAMMA_VALUE_STATUS_MAP: &[(&[u8], &str)] = &[
    (b"\x30", "1.8"),
    (b"\x31", "1.9"),
    (b"\x32", "2.0"),
    (b"\x33", "2.1"),
    (b"\x34", "2.2"),
    (b"\x35", "2.3"),
    (b"\x36", "2.4"),
    (b"\x37", "2.5"),
    (b"\x38", "2.6"),
];

const SOURCE_STATUS_MAP: &[(&[u8], &str)] = &[
    (b"\x00", "Receiver Logo"),
    (b"\x30", "No Signal"),
    (b"\x31", "Signal OK"),
];

const NEWER_MODELS: &[&str] = &["DLA-X90R", "DLA-X70R", "DLA-RS65", "DLA-RS55"];
const LEGACY_MODELS: &[&str] = &["DLA-HD750", "DLA-RS20"];

macro_rules! basic {
    ($name:literal, $prefix:literal, $desc:literal) => {
        CommandSpec {
            name: $name,
            prefix: $prefix,
            description: $desc,
            mapper: ResponseMapper::None,
            models: None,
        }
    };
    ($name:literal, $prefix:literal, $desc:literal, $models:expr) => {
        CommandSpec {
            name: $name,
            prefix: $prefix,
            description: $desc,
            mapper: ResponseMapper::None,
            models: Some($models),
        }
    };
}

macro_rules! query {
    ($prefix:literal, $desc:literal, $mapper:expr) => {
        CommandSpec {
            name: "query",
            prefix: $prefix,
            description: $desc,
            mapper: $mapper,
            models: None,
        }
    };
}

/// Every known command group, in declaration order. Declaration order
/// is the resolution tie-break when no model is known.
pub static GROUPS: &[CommandGroup] = &[
    CommandGroup {
        name: "power",
        code: [0x50, 0x57],
        group_prefix: b"",
        is_advanced: false,
        response_payload_length: 0,
        models: None,
        commands: &[
            // Receivers send no response to power.on unless in Standby,
            // and none to power.off unless On. Cannot cancel
            // Warming/Cooling.
            basic!("on", b"\x31", "Power - On"),
            basic!("off", b"\x30", "Power - Off"),
        ],
    },
    CommandGroup {
        name: "set_input",
        code: [0x49, 0x50],
        group_prefix: b"",
        is_advanced: false,
        response_payload_length: 0,
        models: None,
        commands: &[
            basic!("hdmi_1", b"\x36", "Input - HDMI 1"),
            basic!("hdmi_2", b"\x37", "Input - HDMI 2"),
            basic!("component", b"\x32", "Input - Component"),
            basic!("s_video", b"\x30", "Input - S-Video"),
            basic!("video", b"\x31", "Input - Video"),
            basic!("pc", b"\x33", "Input - PC"),
        ],
    },
    CommandGroup {
        name: "gamma",
        code: [0x47, 0x54],
        group_prefix: b"",
        is_advanced: false,
        response_payload_length: 0,
        models: None,
        commands: &[
            basic!("normal", b"\x30", "Gamma - Normal"),
            basic!("a", b"\x31", "Gamma - A"),
            basic!("b", b"\x32", "Gamma - B"),
            basic!("c", b"\x33", "Gamma - C"),
            basic!("custom_1", b"\x34", "Gamma - Custom 1"),
            basic!("custom_2", b"\x35", "Gamma - Custom 2"),
            basic!("custom_3", b"\x36", "Gamma - Custom 3"),
        ],
    },
    CommandGroup {
        name: "gamma_value",
        code: [0x47, 0x50],
        group_prefix: b"",
        is_advanced: false,
        response_payload_length: 0,
        models: None,
        commands: &[
            basic!("1_8", b"\x30", "Gamma Correction Value - 1.8"),
            basic!("1_9", b"\x31", "Gamma Correction Value - 1.9"),
            basic!("2_0", b"\x32", "Gamma Correction Value - 2.0"),
            basic!("2_1", b"\x33", "Gamma Correction Value - 2.1"),
            basic!("2_2", b"\x34", "Gamma Correction Value - 2.2 (Default)"),
            basic!("2_3", b"\x35", "Gamma Correction Value - 2.3"),
            basic!("2_4", b"\x36", "Gamma Correction Value - 2.4"),
            basic!("2_5", b"\x37", "Gamma Correction Value - 2.5"),
            basic!("2_6", b"\x38", "Gamma Correction Value - 2.6"),
        ],
    },
    CommandGroup {
        name: "lamp_power",
        code: [0x50, 0x4D],
        group_prefix: b"\x4C\x50",
        is_advanced: false,
        response_payload_length: 0,
        models: None,
        commands: &[
            basic!("normal", b"\x30", "Lamp Power - Normal"),
            basic!("high", b"\x31", "Lamp Power - High"),
        ],
    },
    CommandGroup {
        name: "test_command",
        code: [0x00, 0x00],
        group_prefix: b"",
        is_advanced: false,
        response_payload_length: 0,
        models: None,
        commands: &[basic!(
            "null_command",
            b"",
            "Null Command (to check communication)"
        )],
    },
    CommandGroup {
        name: "remote_control",
        code: [0x52, 0x43],
        group_prefix: b"\x37\x33",
        is_advanced: false,
        response_payload_length: 0,
        models: None,
        commands: &[
            basic!("back", b"\x30\x33", "Back - steps backwards through menus"),
            // Overloaded wire bytes: the same infrared code means
            // Anamorphic on newer models and Vertical Stretch on older
            // ones.
            basic!("anamorphic_off", b"\x32\x34", "Anamorphic - Off", NEWER_MODELS),
            basic!(
                "vertical_stretch_off",
                b"\x32\x34",
                "Vertical Stretch - Off",
                LEGACY_MODELS
            ),
            basic!("anamorphic_a", b"\x32\x33", "Anamorphic - A", NEWER_MODELS),
            basic!(
                "vertical_stretch_on",
                b"\x32\x33",
                "Vertical Stretch - On",
                LEGACY_MODELS
            ),
            basic!("aspect_16_9", b"\x32\x36", "Aspect - 16:9"),
            basic!("aspect_4_3", b"\x32\x35", "Aspect - 4:3"),
            basic!("aspect_zoom", b"\x32\x37", "Aspect - Zoom"),
        ],
    },
    // Advanced command groups with data responses.
    CommandGroup {
        name: "power_status",
        code: [0x50, 0x57],
        group_prefix: b"",
        is_advanced: true,
        response_payload_length: 1,
        models: None,
        commands: &[query!(
            b"",
            "Query Power status",
            ResponseMapper::FixedMap(POWER_STATUS_MAP)
        )],
    },
    CommandGroup {
        name: "input_status",
        code: [0x49, 0x50],
        group_prefix: b"",
        is_advanced: true,
        response_payload_length: 1,
        models: None,
        commands: &[query!(
            b"",
            "Query current video input",
            ResponseMapper::FixedMap(INPUT_STATUS_MAP)
        )],
    },
    CommandGroup {
        name: "gamma_table_status",
        code: [0x47, 0x54],
        group_prefix: b"",
        is_advanced: true,
        response_payload_length: 1,
        models: None,
        commands: &[query!(
            b"",
            "Query current gamma table selection",
            ResponseMapper::FixedMap(GAMMA_TABLE_STATUS_MAP)
        )],
    },
    CommandGroup {
        name: "gamma_value_status",
        code: [0x47, 0x50],
        group_prefix: b"",
        is_advanced: true,
        response_payload_length: 1,
        models: None,
        commands: &[query!(
            b"",
            "Query current gamma value",
            ResponseMapper::FixedMap(GAMMA_VALUE_STATUS_MAP)
        )],
    },
    CommandGroup {
        name: "source_status",
        code: [0x53, 0x43],
        group_prefix: b"",
        is_advanced: true,
        response_payload_length: 1,
        models: None,
        commands: &[query!(
            b"",
            "Query current video source status",
            ResponseMapper::FixedMap(SOURCE_STATUS_MAP)
        )],
    },
    CommandGroup {
        name: "model_status",
        code: [0x4D, 0x44],
        group_prefix: b"",
        is_advanced: true,
        response_payload_length: 14,
        models: None,
        commands: &[query!(
            b"",
            "Query current model code",
            ResponseMapper::ModelCode
        )],
    },
    CommandGroup {
        name: "firmware_version_status",
        code: [0x49, 0x46],
        group_prefix: b"",
        is_advanced: true,
        response_payload_length: 6,
        models: None,
        commands: &[query!(
            b"\x53\x56",
            "Query firmware version",
            ResponseMapper::FirmwareVersion
        )],
    },
];

// ── Lookup ───────────────────────────────────────────────────────

static NAME_INDEX: LazyLock<HashMap<String, CommandMeta>> = LazyLock::new(|| {
    let mut index = HashMap::new();
    for group in GROUPS {
        for spec in group.commands {
            let meta = CommandMeta { group, spec };
            index.insert(meta.full_name(), meta);
        }
    }
    index
});

/// Look a command up by its full `"{group}.{name}"` name.
pub fn name_to_meta(full_name: &str) -> Result<CommandMeta, ParcError> {
    NAME_INDEX
        .get(full_name)
        .copied()
        .ok_or_else(|| ParcError::UnknownCommand(full_name.to_string()))
}

/// Iterate over every command in the catalog, in declaration order.
pub fn all_metas() -> impl Iterator<Item = CommandMeta> {
    GROUPS.iter().flat_map(|group| {
        group
            .commands
            .iter()
            .map(move |spec| CommandMeta { group, spec })
    })
}

/// Resolve a command packet back to its candidate metadata.
///
/// More than one candidate means the wire bytes are overloaded across
/// models; `rank_candidates` disambiguates.
pub fn resolve_command_packet(packet: &Packet) -> Vec<CommandMeta> {
    all_metas()
        .filter(|meta| {
            meta.packet_type() == packet.packet_type()
                && meta.command_code() == packet.command_code()
                && meta.command_prefix() == packet.payload()
        })
        .collect()
}

/// Pick one meta from resolution candidates: a model match wins, then
/// declaration order.
pub fn rank_candidates(
    candidates: &[CommandMeta],
    model: Option<&ReceiverModel>,
) -> Option<CommandMeta> {
    if let Some(model) = model
        && let Some(meta) = candidates.iter().find(|m| m.applies_to(model))
    {
        return Some(*meta);
    }
    candidates.first().copied()
}

// ── Tests ────────────────────────────────────────────────────────
