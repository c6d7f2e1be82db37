use std::collections::HashSet;

use anyhow::Result;
use ash::vk;
use ash::vk::Handle;

use lugdunum::{BufferPool, BufferPoolInfo, DescriptorPoolSize, DescriptorSetPool, GraphicsDevice};

use framework::{Failure, MockDevice, ObjectKind};

mod framework;

fn make_pool(device: &MockDevice, per_chunk: u32, size: u64) -> Result<BufferPool<MockDevice>> {
    framework::init_logger();
    BufferPool::new(device.clone(), BufferPoolInfo::uniform("test", per_chunk, size))
}

#[test]
pub fn allocate_same_hash_twice() -> Result<()> {
    let device = MockDevice::new();
    let mut pool = make_pool(&device, 4, 128)?;

    let (updated, first) = pool.allocate(7, false)?;
    let first = *first;
    assert!(updated, "First allocation of a hash should always report an update.");
    let (updated, second) = pool.allocate(7, false)?;
    assert!(!updated, "Clean object that is already in use should not be updated.");
    assert_eq!(second.id(), first.id(), "Same hash should return the same sub-buffer.");
    assert_eq!(second.reference_count(), 2, "Second allocation should take another reference.");

    let (updated, _) = pool.allocate(7, true)?;
    assert!(updated, "Dirty object should be updated even if its sub-buffer is in use.");
    Ok(())
}

#[test]
pub fn distinct_hashes_get_distinct_slots() -> Result<()> {
    let device = MockDevice::new();
    let mut pool = make_pool(&device, 3, 64)?;

    let mut seen = HashSet::new();
    for hash in 1..=10u64 {
        let (_, sub_buffer) = pool.allocate(hash, true)?;
        assert!(
            seen.insert((sub_buffer.buffer().as_raw(), sub_buffer.offset())),
            "Hash {hash} got a range that is already in use."
        );
        assert_eq!(sub_buffer.hash(), hash, "Sub-buffer should record the hash it backs.");
    }
    assert_eq!(pool.in_use_count(), 10);
    Ok(())
}

#[test]
pub fn grows_by_whole_chunks() -> Result<()> {
    let device = MockDevice::new();
    let mut pool = make_pool(&device, 2, 128)?;
    assert_eq!(pool.chunk_count(), 0, "Chunks should only be created on demand.");

    let mut results = Vec::new();
    for hash in [1, 2, 3] {
        let (updated, sub_buffer) = pool.allocate(hash, true)?;
        results.push((updated, *sub_buffer));
    }

    assert_eq!(pool.chunk_count(), 2, "Third hash should need a second chunk.");
    assert_eq!(pool.capacity(), 4);
    assert!(results.iter().all(|(updated, _)| *updated), "Every new hash should be updated.");
    assert_eq!(results[0].1.id().chunk(), 0);
    assert_eq!(results[1].1.id().chunk(), 0);
    assert_eq!(results[2].1.id().chunk(), 1);
    assert_ne!(results[0].1.buffer(), results[2].1.buffer(), "Chunks should have their own buffers.");
    assert_eq!(results[0].1.id().slot(), 0, "Slots should be handed out in ascending order.");
    assert_eq!(results[1].1.id().slot(), 1, "Slots should be handed out in ascending order.");
    assert_eq!(device.live_count(ObjectKind::Buffer), 2);
    Ok(())
}

#[test]
pub fn freed_slot_is_reused() -> Result<()> {
    let device = MockDevice::new();
    let mut pool = make_pool(&device, 2, 128)?;

    let (_, first) = pool.allocate(1, true)?;
    let first = first.id();
    pool.allocate(2, true)?;
    pool.free(first)?;
    assert!(pool.find(1).is_none(), "Freed hash should no longer be found.");
    assert!(pool.get(first).map(|sub| sub.is_free()).unwrap_or(false));

    let (updated, reused) = pool.allocate(3, false)?;
    assert!(updated, "A reused slot holds stale data and must be updated.");
    assert_eq!(reused.id(), first, "The freed slot should be reused before growing.");
    assert_eq!(pool.chunk_count(), 1, "Reusing a slot should not create a chunk.");
    Ok(())
}

#[test]
pub fn references_are_counted() -> Result<()> {
    let device = MockDevice::new();
    let mut pool = make_pool(&device, 2, 128)?;

    let (_, sub_buffer) = pool.allocate(5, true)?;
    let id = sub_buffer.id();
    pool.allocate(5, false)?;
    pool.free(id)?;
    assert_eq!(pool.find(5).map(|sub| sub.reference_count()), Some(1), "One reference should remain.");
    pool.free(id)?;
    assert_eq!(pool.in_use_count(), 0);
    assert_eq!(pool.free_count(), 2);
    assert!(pool.free(id).is_err(), "Freeing a free slot should fail.");
    Ok(())
}

#[test]
pub fn stride_respects_uniform_alignment() -> Result<()> {
    let device = MockDevice::new();
    let mut pool = make_pool(&device, 4, 100)?;
    let alignment = device.limits().min_uniform_buffer_offset_alignment;

    assert_eq!(pool.sub_buffer_size(), 100, "Size is already a multiple of 4.");
    assert_eq!(pool.stride() % alignment, 0, "Stride should be aligned for dynamic uniform offsets.");
    for hash in 1..=4 {
        let (_, sub_buffer) = pool.allocate(hash, true)?;
        assert_eq!(sub_buffer.offset() % alignment, 0, "Offsets should be aligned.");
        let info = sub_buffer.descriptor_info();
        assert_eq!(info.range, 100, "Descriptor should cover exactly the sub-buffer.");
    }
    Ok(())
}

#[test]
pub fn zero_hash_is_rejected() -> Result<()> {
    let device = MockDevice::new();
    let mut pool = make_pool(&device, 2, 16)?;
    assert!(pool.allocate(0, true).is_err(), "Hash 0 is reserved for free slots.");
    assert_eq!(pool.chunk_count(), 0, "A rejected allocation should not grow the pool.");
    Ok(())
}

#[test]
pub fn empty_pool_is_rejected() {
    let device = MockDevice::new();
    assert!(make_pool(&device, 0, 16).is_err(), "Pool without slots should be rejected.");
    assert!(make_pool(&device, 4, 0).is_err(), "Pool with empty slots should be rejected.");
}

#[test]
pub fn chunk_failure_leaves_pool_usable() -> Result<()> {
    let device = MockDevice::new();
    let mut pool = make_pool(&device, 1, 64)?;

    device.fail_next(Failure::AllocateMemory);
    assert!(pool.allocate(1, true).is_err(), "Allocation should fail when the chunk cannot be created.");
    assert_eq!(pool.chunk_count(), 0);
    assert_eq!(device.live_count(ObjectKind::Buffer), 0, "The chunk buffer should be destroyed again.");

    let (updated, _) = pool.allocate(1, true)?;
    assert!(updated);
    assert_eq!(pool.chunk_count(), 1);
    Ok(())
}

#[test]
pub fn dropping_pool_releases_chunks() -> Result<()> {
    let device = MockDevice::new();
    {
        let mut pool = make_pool(&device, 2, 64)?;
        for hash in 1..=5 {
            pool.allocate(hash, true)?;
        }
        assert_eq!(device.live_count(ObjectKind::Memory), 3);
    }
    assert!(device.live_objects().is_empty(), "Pool should release all chunks: {:?}", device.live_objects());
    Ok(())
}

#[test]
pub fn descriptor_set_is_shared_by_hash() -> Result<()> {
    let device = MockDevice::new();
    let size = DescriptorPoolSize::new().with(vk::DescriptorType::UNIFORM_BUFFER, 1);
    let mut pool = DescriptorSetPool::new(device.clone(), "camera", 4, &size)?;
    let layout = device.create_descriptor_set_layout(&[])?;

    let (updated, set) = pool.allocate(11, layout)?;
    let (id, handle) = (set.id(), set.handle());
    assert!(updated, "A new set must be written before use.");
    assert_ne!(handle, vk::DescriptorSet::null());
    let (updated, set) = pool.allocate(11, layout)?;
    assert!(!updated, "A set in use already holds its descriptors.");
    assert_eq!(set.handle(), handle);
    assert_eq!(set.reference_count(), 2);

    pool.free(id)?;
    pool.free(id)?;
    assert_eq!(pool.free_count(), 4);
    assert!(pool.free(id).is_err(), "Freeing a free set should fail.");

    let (updated, set) = pool.allocate(12, layout)?;
    assert!(updated, "A reused set holds descriptors of another hash.");
    assert_eq!(set.handle(), handle, "Native sets with the same layout should be reused.");
    device.destroy_descriptor_set_layout(layout);
    Ok(())
}

#[test]
pub fn descriptor_pool_exhaustion_is_an_error() -> Result<()> {
    let device = MockDevice::new();
    let size = DescriptorPoolSize::new().with(vk::DescriptorType::UNIFORM_BUFFER, 1);
    let mut pool = DescriptorSetPool::new(device.clone(), "lights", 2, &size)?;
    let layout = device.create_descriptor_set_layout(&[])?;

    pool.allocate(1, layout)?;
    pool.allocate(2, layout)?;
    let err = pool.allocate(3, layout).expect_err("Third set should not fit.");
    assert!(
        matches!(
            err.downcast_ref::<lugdunum::Error>(),
            Some(lugdunum::Error::DescriptorPoolExhausted { max_sets: 2, .. })
        ),
        "Exhaustion should be reported as such, got {err}."
    );
    assert_eq!(pool.in_use_count(), 2, "A failed allocation should not touch sets in use.");
    device.destroy_descriptor_set_layout(layout);
    Ok(())
}

#[test]
pub fn descriptor_set_failure_keeps_slot_free() -> Result<()> {
    let device = MockDevice::new();
    let size = DescriptorPoolSize::new().with(vk::DescriptorType::UNIFORM_BUFFER, 1);
    let mut pool = DescriptorSetPool::new(device.clone(), "material", 1, &size)?;
    let layout = device.create_descriptor_set_layout(&[])?;

    device.fail_next(Failure::AllocateDescriptorSet);
    assert!(pool.allocate(1, layout).is_err());
    assert_eq!(pool.free_count(), 1, "The slot should stay free after a failed allocation.");
    let (updated, _) = pool.allocate(1, layout)?;
    assert!(updated);
    device.destroy_descriptor_set_layout(layout);
    Ok(())
}
