//! Wire protocol: packet framing, handshake constants, and the static
//! command catalog.

pub mod catalog;
pub mod codec;
pub mod command;
pub mod constants;
pub mod model;
pub mod packet;

pub use catalog::{
    all_metas, name_to_meta, rank_candidates, resolve_command_packet, CommandGroup, CommandMeta,
    CommandSpec, ResponseMapper,
};
pub use codec::PacketCodec;
pub use command::{Command, Response};
pub use model::{model_by_name, model_for_status_payload, ReceiverModel, MODELS};
pub use packet::{Packet, PacketType};
