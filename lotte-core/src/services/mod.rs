pub mod api;
pub mod debounce;
pub mod machine_translation;
pub mod spellcheck;
pub mod stringset;
pub mod sync;
pub mod sync_types;
