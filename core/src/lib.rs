pub mod document;
pub mod patch;
pub mod repair;
pub mod table_id;
pub mod version;
pub mod wire;

pub use document::{
    local_schema_version, participant_id, GameDocument, Participant, Role, SafetyTools,
};
pub use patch::DocumentPatch;
pub use repair::{decode_sparse_maps, repair, Repaired, RepairWarning, SPARSE_MAP_FIELDS};
pub use table_id::{is_valid_table_id, TableId, TableIdError, TABLE_ID_ALPHABET, TABLE_ID_LEN};
pub use version::{compare, is_at_or_after, should_block, VersionCmp};
pub use wire::{decode_frame, encode_frame, ClientFrame, ServerFrame};
