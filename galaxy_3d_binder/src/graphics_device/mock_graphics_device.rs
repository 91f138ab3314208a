/// Mock graphics device (no GPU required)
///
/// Records every command into a shared log, keeps descriptor slot contents
/// and buffer bytes in memory, and lets tests decide when submitted work
/// "completes" so blocking fence waits can be observed.

use std::any::Any;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};

use crate::descriptor::DescriptorHeapKind;
use crate::error::{Error, Result};
use crate::graphics_device::{
    Barrier, BindingSlot, Buffer, BufferDesc, CommandList, DescriptorStorage, Fence,
    GraphicsDevice, MemoryLocation, Pipeline, PipelineBindPoint, RenderingInfo, ResourceView,
    Swapchain, Texture, TextureDesc, TextureFormat, TextureInfo, TextureUsage,
};
use crate::state::ResourceAccessState;

const MOCK_SOURCE: &str = "galaxy3d::mock";

/// Base of the fake address space of descriptor storage `id`
const STORAGE_ADDRESS_SHIFT: u32 = 40;
/// Tag distinguishing GPU descriptor addresses from CPU ones
const GPU_DESCRIPTOR_TAG: u64 = 1 << 60;

fn lock<'a, T>(mutex: &'a Mutex<T>, what: &str) -> Result<MutexGuard<'a, T>> {
    mutex
        .lock()
        .map_err(|_| Error::BackendError(format!("mock {} lock poisoned", what)))
}

/// Descriptor size reported by the mock device, per kind
pub fn mock_descriptor_increment(kind: DescriptorHeapKind) -> u64 {
    match kind {
        DescriptorHeapKind::ShaderResource => 32,
        DescriptorHeapKind::Sampler => 16,
        DescriptorHeapKind::ColorAttachment | DescriptorHeapKind::DepthAttachment => 8,
    }
}

// ============================================================================
// Command log
// ============================================================================

/// One recorded command, in recording order
#[derive(Debug, Clone, PartialEq)]
pub enum MockCommand {
    Begin,
    End,
    Barrier {
        resource: String,
        slice: u32,
        mip: u32,
        before: ResourceAccessState,
        after: ResourceAccessState,
    },
    Resolve { src: String, dst: String },
    ClearColor { target: String, color: [f32; 4] },
    BeginRendering(RenderingInfo),
    EndRendering,
    BindPipeline(String),
    SetDescriptorTable { slot: BindingSlot, gpu_address: u64 },
    SetUniformAddress(u64),
    Draw { vertex_count: u32, instance_count: u32 },
    Dispatch { x: u32, y: u32, z: u32 },
    CopyBuffer { src: String, dst: String, size: u64 },
    CopyBufferToTexture { src: String, dst: String, mip: u32, slice: u32 },
    Submit { command_lists: usize, signal_value: u64 },
    Present(u32),
}

type CommandLog = Arc<Mutex<Vec<MockCommand>>>;

// ============================================================================
// Mock Buffer
// ============================================================================

pub struct MockBuffer {
    pub name: String,
    pub size: u64,
    pub location: MemoryLocation,
    gpu_address: u64,
    data: Mutex<Vec<u8>>,
}

impl MockBuffer {
    pub fn new(name: String, size: u64, location: MemoryLocation, gpu_address: u64) -> Self {
        Self {
            name,
            size,
            location,
            gpu_address,
            data: Mutex::new(vec![0; size as usize]),
        }
    }

    /// Copy of the buffer bytes
    pub fn contents(&self) -> Vec<u8> {
        match self.data.lock() {
            Ok(data) => data.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Copy of `len` bytes at `offset`
    pub fn read(&self, offset: u64, len: usize) -> Vec<u8> {
        let contents = self.contents();
        let start = (offset as usize).min(contents.len());
        let end = (start + len).min(contents.len());
        contents[start..end].to_vec()
    }
}

impl Buffer for MockBuffer {
    fn name(&self) -> &str {
        &self.name
    }

    fn size(&self) -> u64 {
        self.size
    }

    fn update(&self, offset: u64, data: &[u8]) -> Result<()> {
        if self.location == MemoryLocation::GpuOnly {
            return Err(Error::BackendError(format!("buffer '{}' is not CPU-visible", self.name)));
        }
        let end = offset
            .checked_add(data.len() as u64)
            .filter(|&end| end <= self.size)
            .ok_or_else(|| {
                Error::InvalidResource(format!(
                    "write of {} bytes at {} exceeds buffer '{}' ({} bytes)",
                    data.len(),
                    offset,
                    self.name,
                    self.size
                ))
            })?;
        let mut bytes = lock(&self.data, "buffer")?;
        bytes[offset as usize..end as usize].copy_from_slice(data);
        Ok(())
    }

    fn gpu_address(&self) -> u64 {
        self.gpu_address
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

// ============================================================================
// Mock Texture
// ============================================================================

pub struct MockTexture {
    pub info: TextureInfo,
}

impl MockTexture {
    pub fn new(desc: &TextureDesc) -> Self {
        Self {
            info: TextureInfo::from_desc(desc),
        }
    }
}

impl Texture for MockTexture {
    fn info(&self) -> &TextureInfo {
        &self.info
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

// ============================================================================
// Mock Pipeline
// ============================================================================

pub struct MockPipeline {
    pub name: String,
    pub bind_point: PipelineBindPoint,
}

impl MockPipeline {
    pub fn new(name: &str, bind_point: PipelineBindPoint) -> Self {
        Self {
            name: name.to_string(),
            bind_point,
        }
    }
}

impl Pipeline for MockPipeline {
    fn bind_point(&self) -> PipelineBindPoint {
        self.bind_point
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

// ============================================================================
// Mock Descriptor Storage
// ============================================================================

pub struct MockDescriptorStorage {
    id: u32,
    kind: DescriptorHeapKind,
    capacity: u32,
    slots: Mutex<Vec<Option<String>>>,
    writes: AtomicU64,
    copies: AtomicU64,
}

impl MockDescriptorStorage {
    pub fn new(id: u32, kind: DescriptorHeapKind, capacity: u32) -> Self {
        Self {
            id,
            kind,
            capacity,
            slots: Mutex::new(vec![None; capacity as usize]),
            writes: AtomicU64::new(0),
            copies: AtomicU64::new(0),
        }
    }

    /// Debug description of the view written at `index`
    pub fn slot(&self, index: u32) -> Option<String> {
        self.slots.lock().ok()?.get(index as usize).cloned().flatten()
    }

    /// Number of `write` calls so far
    pub fn write_count(&self) -> u64 {
        self.writes.load(Ordering::Relaxed)
    }

    /// Number of slots copied so far
    pub fn copy_count(&self) -> u64 {
        self.copies.load(Ordering::Relaxed)
    }

    fn check_range(&self, first: u32, count: u32) -> Result<()> {
        match first.checked_add(count) {
            Some(end) if end <= self.capacity => Ok(()),
            _ => Err(Error::InvalidResource(format!(
                "slots {}..+{} outside {} storage of {} slots",
                first, count, self.kind, self.capacity
            ))),
        }
    }
}

impl DescriptorStorage for MockDescriptorStorage {
    fn kind(&self) -> DescriptorHeapKind {
        self.kind
    }

    fn capacity(&self) -> u32 {
        self.capacity
    }

    fn increment(&self) -> u64 {
        mock_descriptor_increment(self.kind)
    }

    fn cpu_base(&self) -> u64 {
        (self.id as u64 + 1) << STORAGE_ADDRESS_SHIFT
    }

    fn gpu_base(&self) -> u64 {
        if self.kind.is_shader_visible() {
            GPU_DESCRIPTOR_TAG | self.cpu_base()
        } else {
            0
        }
    }

    fn write(&self, index: u32, view: &ResourceView) -> Result<()> {
        self.check_range(index, 1)?;
        if view.heap_kind() != self.kind {
            return Err(Error::InvalidResource(format!(
                "{:?} cannot be written into a {} storage",
                view, self.kind
            )));
        }
        let mut slots = lock(&self.slots, "descriptor storage")?;
        slots[index as usize] = Some(format!("{:?}", view));
        self.writes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn copy(&self, dst: u32, src: u32, count: u32) -> Result<()> {
        self.check_range(dst, count)?;
        self.check_range(src, count)?;
        let mut slots = lock(&self.slots, "descriptor storage")?;
        for i in 0..count as usize {
            slots[dst as usize + i] = slots[src as usize + i].clone();
        }
        self.copies.fetch_add(count as u64, Ordering::Relaxed);
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

// ============================================================================
// Mock Fence
// ============================================================================

struct FenceState {
    completed: Mutex<u64>,
    signaled: Condvar,
}

impl FenceState {
    fn signal(&self, value: u64) {
        if let Ok(mut completed) = self.completed.lock() {
            if value > *completed {
                *completed = value;
            }
            self.signaled.notify_all();
        }
    }
}

pub struct MockFence {
    state: Arc<FenceState>,
}

impl MockFence {
    pub fn new(initial_value: u64) -> Self {
        Self {
            state: Arc::new(FenceState {
                completed: Mutex::new(initial_value),
                signaled: Condvar::new(),
            }),
        }
    }

    /// Raise the counter to `value` (never lowers it)
    pub fn signal(&self, value: u64) {
        self.state.signal(value);
    }
}

impl Fence for MockFence {
    fn completed_value(&self) -> Result<u64> {
        Ok(*lock(&self.state.completed, "fence")?)
    }

    fn wait(&self, value: u64) -> Result<()> {
        let mut completed = lock(&self.state.completed, "fence")?;
        while *completed < value {
            completed = self
                .state
                .signaled
                .wait(completed)
                .map_err(|_| Error::BackendError("mock fence lock poisoned".to_string()))?;
        }
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

// ============================================================================
// Mock Command List
// ============================================================================

pub struct MockCommandList {
    log: CommandLog,
    recording: bool,
    recorded: usize,
}

impl MockCommandList {
    fn new(log: CommandLog) -> Self {
        Self {
            log,
            recording: false,
            recorded: 0,
        }
    }

    pub fn is_recording(&self) -> bool {
        self.recording
    }

    /// Commands recorded since the last `begin`
    pub fn recorded_count(&self) -> usize {
        self.recorded
    }

    fn record(&mut self, command: MockCommand) -> Result<()> {
        if !self.recording {
            return Err(Error::BackendError(format!(
                "command list is not recording (got {:?})",
                command
            )));
        }
        lock(&self.log, "command log")?.push(command);
        self.recorded += 1;
        Ok(())
    }
}

impl CommandList for MockCommandList {
    fn begin(&mut self) -> Result<()> {
        self.recording = true;
        self.recorded = 0;
        lock(&self.log, "command log")?.push(MockCommand::Begin);
        Ok(())
    }

    fn end(&mut self) -> Result<()> {
        if !self.recording {
            return Err(Error::BackendError("end() on a command list that is not recording".to_string()));
        }
        lock(&self.log, "command log")?.push(MockCommand::End);
        self.recording = false;
        Ok(())
    }

    fn resource_barriers(&mut self, barriers: &[Barrier]) -> Result<()> {
        for barrier in barriers {
            self.record(MockCommand::Barrier {
                resource: barrier.resource.name().to_string(),
                slice: barrier.slice,
                mip: barrier.mip,
                before: barrier.before,
                after: barrier.after,
            })?;
        }
        Ok(())
    }

    fn resolve_texture(&mut self, src: &dyn Texture, dst: &dyn Texture) -> Result<()> {
        self.record(MockCommand::Resolve {
            src: src.info().name.clone(),
            dst: dst.info().name.clone(),
        })
    }

    fn clear_color_target(&mut self, target: &dyn Texture, color: [f32; 4]) -> Result<()> {
        self.record(MockCommand::ClearColor {
            target: target.info().name.clone(),
            color,
        })
    }

    fn begin_rendering(&mut self, info: &RenderingInfo) -> Result<()> {
        self.record(MockCommand::BeginRendering(info.clone()))
    }

    fn end_rendering(&mut self) -> Result<()> {
        self.record(MockCommand::EndRendering)
    }

    fn bind_pipeline(&mut self, pipeline: &dyn Pipeline) -> Result<()> {
        let name = pipeline
            .as_any()
            .downcast_ref::<MockPipeline>()
            .map(|p| p.name.clone())
            .unwrap_or_else(|| "<foreign pipeline>".to_string());
        self.record(MockCommand::BindPipeline(name))
    }

    fn set_descriptor_table(&mut self, slot: BindingSlot, gpu_address: u64) -> Result<()> {
        self.record(MockCommand::SetDescriptorTable { slot, gpu_address })
    }

    fn set_uniform_address(&mut self, gpu_address: u64) -> Result<()> {
        self.record(MockCommand::SetUniformAddress(gpu_address))
    }

    fn draw(&mut self, vertex_count: u32, instance_count: u32, _first_vertex: u32, _first_instance: u32) -> Result<()> {
        self.record(MockCommand::Draw { vertex_count, instance_count })
    }

    fn dispatch(&mut self, x: u32, y: u32, z: u32) -> Result<()> {
        self.record(MockCommand::Dispatch { x, y, z })
    }

    fn copy_buffer(&mut self, src: &dyn Buffer, src_offset: u64, dst: &dyn Buffer, dst_offset: u64, size: u64) -> Result<()> {
        // Copies land immediately so uploads are observable without a GPU
        let src_mock = src.as_any().downcast_ref::<MockBuffer>();
        let dst_mock = dst.as_any().downcast_ref::<MockBuffer>();
        if let (Some(src_mock), Some(dst_mock)) = (src_mock, dst_mock) {
            let bytes = src_mock.read(src_offset, size as usize);
            let mut data = lock(&dst_mock.data, "buffer")?;
            let start = (dst_offset as usize).min(data.len());
            let end = (start + bytes.len()).min(data.len());
            data[start..end].copy_from_slice(&bytes[..end - start]);
        }
        self.record(MockCommand::CopyBuffer {
            src: src.name().to_string(),
            dst: dst.name().to_string(),
            size,
        })
    }

    fn copy_buffer_to_texture(&mut self, src: &dyn Buffer, _src_offset: u64, dst: &dyn Texture, mip: u32, slice: u32) -> Result<()> {
        self.record(MockCommand::CopyBufferToTexture {
            src: src.name().to_string(),
            dst: dst.info().name.clone(),
            mip,
            slice,
        })
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

// ============================================================================
// Mock Swapchain
// ============================================================================

pub struct MockSwapchain {
    images: Vec<Arc<dyn Texture>>,
    extent: (u32, u32),
    next: u32,
    log: CommandLog,
}

impl MockSwapchain {
    /// Swapchain of `image_count` back buffers named `back_buffer_<i>`
    pub fn new(device: &MockGraphicsDevice, image_count: u32, width: u32, height: u32) -> Self {
        let images = (0..image_count)
            .map(|i| {
                Arc::new(MockTexture::new(&TextureDesc {
                    name: format!("back_buffer_{}", i),
                    width,
                    height,
                    format: TextureFormat::B8G8R8A8_SRGB,
                    usage: TextureUsage::COLOR_ATTACHMENT | TextureUsage::TRANSFER_DST,
                    ..TextureDesc::default()
                })) as Arc<dyn Texture>
            })
            .collect();
        Self {
            images,
            extent: (width, height),
            next: 0,
            log: device.log.clone(),
        }
    }
}

impl Swapchain for MockSwapchain {
    fn acquire_next_image(&mut self) -> Result<u32> {
        let index = self.next;
        self.next = (self.next + 1) % self.images.len().max(1) as u32;
        Ok(index)
    }

    fn back_buffer(&self, index: u32) -> Option<Arc<dyn Texture>> {
        self.images.get(index as usize).cloned()
    }

    fn present(&mut self, index: u32) -> Result<()> {
        if index as usize >= self.images.len() {
            return Err(Error::InvalidResource(format!("no back buffer {}", index)));
        }
        lock(&self.log, "command log")?.push(MockCommand::Present(index));
        Ok(())
    }

    fn image_count(&self) -> usize {
        self.images.len()
    }

    fn extent(&self) -> (u32, u32) {
        self.extent
    }

    fn format(&self) -> TextureFormat {
        TextureFormat::B8G8R8A8_SRGB
    }
}

// ============================================================================
// Mock Graphics Device
// ============================================================================

/// When submitted work completes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FenceCompletion {
    /// Fences are signaled during `submit`
    Immediate,
    /// Fences are signaled by `retire_next` / `retire_all`
    Manual,
}

pub struct MockGraphicsDevice {
    completion: Mutex<FenceCompletion>,
    pending: Mutex<VecDeque<(Arc<FenceState>, u64)>>,
    drained: Condvar,
    log: CommandLog,
    storages: Mutex<Vec<Arc<MockDescriptorStorage>>>,
    buffers: Mutex<Vec<Arc<MockBuffer>>>,
    injected_failure: Mutex<Option<i32>>,
    next_storage_id: AtomicU32,
    next_gpu_address: AtomicU64,
    submissions: AtomicU64,
    frame_submissions: AtomicU64,
}

impl MockGraphicsDevice {
    pub fn new() -> Self {
        Self::with_completion(FenceCompletion::Immediate)
    }

    pub fn with_completion(completion: FenceCompletion) -> Self {
        Self {
            completion: Mutex::new(completion),
            pending: Mutex::new(VecDeque::new()),
            drained: Condvar::new(),
            log: Arc::new(Mutex::new(Vec::new())),
            storages: Mutex::new(Vec::new()),
            buffers: Mutex::new(Vec::new()),
            injected_failure: Mutex::new(None),
            next_storage_id: AtomicU32::new(0),
            next_gpu_address: AtomicU64::new(0x1_0000_0000),
            submissions: AtomicU64::new(0),
            frame_submissions: AtomicU64::new(0),
        }
    }

    /// Switch completion mode; switching to `Immediate` retires pending work
    pub fn set_fence_completion(&self, completion: FenceCompletion) {
        if let Ok(mut mode) = self.completion.lock() {
            *mode = completion;
        }
        if completion == FenceCompletion::Immediate {
            self.retire_all();
        }
    }

    /// Complete the oldest pending submission, returns its signal value
    pub fn retire_next(&self) -> Option<u64> {
        let (state, value) = self.pending.lock().ok()?.pop_front()?;
        state.signal(value);
        if let Ok(pending) = self.pending.lock() {
            if pending.is_empty() {
                self.drained.notify_all();
            }
        }
        Some(value)
    }

    /// Complete every pending submission, returns how many there were
    pub fn retire_all(&self) -> usize {
        let mut count = 0;
        while self.retire_next().is_some() {
            count += 1;
        }
        count
    }

    /// Submissions whose fence has not been signaled yet
    pub fn pending_submissions(&self) -> usize {
        self.pending.lock().map(|p| p.len()).unwrap_or(0)
    }

    /// Total number of `submit` calls
    pub fn submission_count(&self) -> u64 {
        self.submissions.load(Ordering::Relaxed)
    }

    /// Number of `submit_frame` calls (also counted by `submission_count`)
    pub fn frame_submission_count(&self) -> u64 {
        self.frame_submissions.load(Ordering::Relaxed)
    }

    /// Snapshot of the command log
    pub fn commands(&self) -> Vec<MockCommand> {
        self.log.lock().map(|log| log.clone()).unwrap_or_default()
    }

    pub fn clear_commands(&self) {
        if let Ok(mut log) = self.log.lock() {
            log.clear();
        }
    }

    /// Make the next creation or submission fail with `DeviceFailure { code }`
    pub fn fail_next_operation(&self, code: i32) {
        if let Ok(mut failure) = self.injected_failure.lock() {
            *failure = Some(code);
        }
    }

    /// Most recently created descriptor storage of `kind`
    pub fn descriptor_storage(&self, kind: DescriptorHeapKind) -> Option<Arc<MockDescriptorStorage>> {
        self.storages
            .lock()
            .ok()?
            .iter()
            .rev()
            .find(|s| s.kind == kind)
            .cloned()
    }

    /// Buffer created with `name`
    pub fn buffer(&self, name: &str) -> Option<Arc<MockBuffer>> {
        self.buffers.lock().ok()?.iter().find(|b| b.name == name).cloned()
    }

    fn take_injected_failure(&self, operation: &str) -> Result<()> {
        match lock(&self.injected_failure, "failure injection")?.take() {
            Some(code) => {
                crate::engine_error!(MOCK_SOURCE, "Injected failure {} in {}", code, operation);
                Err(Error::DeviceFailure {
                    code,
                    message: format!("injected failure in {}", operation),
                })
            }
            None => Ok(()),
        }
    }
}

impl Default for MockGraphicsDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl GraphicsDevice for MockGraphicsDevice {
    fn backend_name(&self) -> &str {
        "mock"
    }

    fn create_texture(&self, desc: TextureDesc) -> Result<Arc<dyn Texture>> {
        self.take_injected_failure("create_texture")?;
        if desc.width == 0 || desc.height == 0 {
            return Err(Error::InvalidResource(format!("texture '{}' has a zero extent", desc.name)));
        }
        Ok(Arc::new(MockTexture::new(&desc)))
    }

    fn create_buffer(&self, desc: BufferDesc) -> Result<Arc<dyn Buffer>> {
        self.take_injected_failure("create_buffer")?;
        if desc.size == 0 {
            return Err(Error::InvalidResource(format!("buffer '{}' has size 0", desc.name)));
        }
        let span = (desc.size + 0xFFFF) & !0xFFFF;
        let address = self.next_gpu_address.fetch_add(span, Ordering::Relaxed);
        let buffer = Arc::new(MockBuffer::new(desc.name, desc.size, desc.location, address));
        lock(&self.buffers, "buffer list")?.push(buffer.clone());
        Ok(buffer)
    }

    fn create_descriptor_storage(&self, kind: DescriptorHeapKind, capacity: u32) -> Result<Arc<dyn DescriptorStorage>> {
        self.take_injected_failure("create_descriptor_storage")?;
        let id = self.next_storage_id.fetch_add(1, Ordering::Relaxed);
        let storage = Arc::new(MockDescriptorStorage::new(id, kind, capacity));
        lock(&self.storages, "storage list")?.push(storage.clone());
        Ok(storage)
    }

    fn create_fence(&self, initial_value: u64) -> Result<Arc<dyn Fence>> {
        self.take_injected_failure("create_fence")?;
        Ok(Arc::new(MockFence::new(initial_value)))
    }

    fn create_command_list(&self) -> Result<Box<dyn CommandList>> {
        self.take_injected_failure("create_command_list")?;
        Ok(Box::new(MockCommandList::new(self.log.clone())))
    }

    fn submit(&self, command_lists: &[&dyn CommandList], fence: &dyn Fence, signal_value: u64) -> Result<()> {
        self.take_injected_failure("submit")?;

        for list in command_lists {
            if let Some(mock) = list.as_any().downcast_ref::<MockCommandList>() {
                if mock.is_recording() {
                    return Err(Error::BackendError("submitted a command list that is still recording".to_string()));
                }
            }
        }

        let state = fence
            .as_any()
            .downcast_ref::<MockFence>()
            .map(|f| f.state.clone())
            .ok_or_else(|| Error::BackendError("mock device can only signal mock fences".to_string()))?;

        lock(&self.log, "command log")?.push(MockCommand::Submit {
            command_lists: command_lists.len(),
            signal_value,
        });
        self.submissions.fetch_add(1, Ordering::Relaxed);

        match *lock(&self.completion, "completion mode")? {
            FenceCompletion::Immediate => state.signal(signal_value),
            FenceCompletion::Manual => lock(&self.pending, "pending queue")?.push_back((state, signal_value)),
        }
        Ok(())
    }

    fn submit_frame(&self, command_lists: &[&dyn CommandList], fence: &dyn Fence, signal_value: u64) -> Result<()> {
        self.submit(command_lists, fence, signal_value)?;
        self.frame_submissions.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn wait_idle(&self) -> Result<()> {
        let mut pending = lock(&self.pending, "pending queue")?;
        while !pending.is_empty() {
            pending = self
                .drained
                .wait(pending)
                .map_err(|_| Error::BackendError("mock pending queue lock poisoned".to_string()))?;
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "mock_graphics_device_tests.rs"]
mod tests;
