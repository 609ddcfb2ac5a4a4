#![forbid(unsafe_code)]

mod common;

use common::MockBackend;
use dualstore_core::Mode;
use dualstore_persist::{KvStore, MemoryKvStore};
use dualstore_router::{set_dual_writing_mode, StaticGate};

#[test]
fn unset_mode_wires_legacy_only_and_persists_default() {
    let kv = MemoryKvStore::new();
    let gate = StaticGate::new();
    let dw = set_dual_writing_mode(
        &kv,
        &gate,
        "playlists",
        "default",
        MockBackend::new("legacy"),
        MockBackend::new("unified"),
    )
    .unwrap();
    assert_eq!(dw.mode(), Mode::LegacyOnly);
    assert_eq!(kv.get("playlists_default").unwrap().as_deref(), Some("1"));
}

#[test]
fn corrupted_mode_never_resolves_into_unified() {
    let kv = MemoryKvStore::new();
    kv.set("playlists_default", "banana").unwrap();
    let gate = StaticGate::new();
    let dw = set_dual_writing_mode(
        &kv,
        &gate,
        "playlists",
        "default",
        MockBackend::new("legacy"),
        MockBackend::new("unified"),
    )
    .unwrap();
    assert_eq!(dw.mode(), Mode::LegacyOnly);
}

#[test]
fn gate_advances_to_shadow_write() {
    let kv = MemoryKvStore::new();
    let gate = StaticGate::new().enable("playlists");
    let dw = set_dual_writing_mode(
        &kv,
        &gate,
        "playlists",
        "default",
        MockBackend::new("legacy"),
        MockBackend::new("unified"),
    )
    .unwrap();
    assert_eq!(dw.mode(), Mode::ShadowWrite);
    assert_eq!(kv.get("playlists_default").unwrap().as_deref(), Some("2"));
}

#[test]
fn persisted_later_modes_are_respected() {
    let kv = MemoryKvStore::new();
    kv.set("playlists_default", "4").unwrap();
    let gate = StaticGate::new().enable("playlists");
    let dw = set_dual_writing_mode(
        &kv,
        &gate,
        "playlists",
        "default",
        MockBackend::new("legacy"),
        MockBackend::new("unified"),
    )
    .unwrap();
    assert_eq!(dw.mode(), Mode::UnifiedOnly);
}
