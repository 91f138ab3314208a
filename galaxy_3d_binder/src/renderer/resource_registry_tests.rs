//! Unit tests for resource_registry.rs

use std::sync::{Arc, Mutex};

use serial_test::serial;

use crate::engine::Engine;
use crate::error::Error;
use crate::graphics_device::mock_graphics_device::MockTexture;
use crate::graphics_device::TextureDesc;
use crate::log::{LogSeverity, MemoryLogger};
use crate::renderer::ResourceRegistry;
use crate::state::{ResourceAccessState, TrackedResource};

fn tracked(name: &str) -> TrackedResource {
    let texture = Arc::new(MockTexture::new(&TextureDesc {
        name: name.to_string(),
        ..TextureDesc::default()
    }));
    TrackedResource::texture(texture, ResourceAccessState::ShaderRead)
}

#[test]
fn test_insert_get_release() {
    let mut registry = ResourceRegistry::new();
    let id = registry.insert(tracked("albedo"));
    assert_eq!(registry.live_count(), 1);
    assert_eq!(registry.get(id).unwrap().name(), "albedo");

    let resource = registry.release(id).unwrap();
    assert_eq!(resource.name(), "albedo");
    assert!(!registry.contains(id));
    assert!(matches!(registry.get(id), Err(Error::InvalidResource(_))));
    assert!(matches!(registry.release(id), Err(Error::InvalidResource(_))));
}

#[test]
fn test_pair_borrow() {
    let mut registry = ResourceRegistry::new();
    let a = registry.insert(tracked("a"));
    let b = registry.insert(tracked("b"));

    let (first, second) = registry.get_pair_mut(a, b).unwrap();
    assert_eq!(first.name(), "a");
    assert_eq!(second.name(), "b");

    assert!(registry.get_pair_mut(a, a).is_err());
    registry.release(b).unwrap();
    assert!(registry.get_pair_mut(a, b).is_err());
}

#[test]
#[serial]
fn test_check_leaks_logs_each_resource() {
    let logger = MemoryLogger::new();
    Engine::set_logger(logger.clone());

    let mut registry = ResourceRegistry::new();
    registry.insert(tracked("forgotten"));
    let released = registry.insert(tracked("released"));
    registry.release(released).unwrap();

    assert_eq!(registry.check_leaks(), 1);
    let leaks: Vec<_> = logger
        .entries()
        .into_iter()
        .filter(|e| e.message.contains("'forgotten'"))
        .collect();
    assert_eq!(leaks.len(), 1);
    assert_eq!(leaks[0].severity, LogSeverity::Error);
    assert!(!logger.contains("'released'"));

    Engine::reset_logger();
}

#[test]
fn test_registry_is_send() {
    fn assert_send<T: Send>(_: &T) {}
    let registry = Mutex::new(ResourceRegistry::new());
    assert_send(&registry);
}
