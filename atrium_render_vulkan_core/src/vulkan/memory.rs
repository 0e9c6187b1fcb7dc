use ash::vk;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MemoryError {
    #[error("Failed to find suitable memory type")]
    FindSuitableMemoryTypeFailed,

    #[error("Failed to create image: {0}")]
    CreateImageFailed(String),

    #[error("Failed to allocate memory: {0}")]
    AllocateMemoryFailed(String),

    #[error("Failed to bind memory to image: {0}")]
    BindMemoryToImageFailed(String),

    #[error("Failed to create buffer: {0}")]
    CreateBufferFailed(String),

    #[error("Failed to bind memory to buffer: {0}")]
    BindMemoryToBufferFailed(String),

    #[error("Failed to map memory: {0}")]
    MapMemoryFailed(String),

    #[error("Failed to record upload commands: {0}")]
    RecordUploadFailed(String),

    #[error("Failed to submit upload commands: {0}")]
    SubmitUploadFailed(String),
}

pub fn find_memory_type(
    instance: &ash::Instance,
    physical_device: vk::PhysicalDevice,
    type_filter: u32,
    properties: vk::MemoryPropertyFlags,
) -> Result<u32, MemoryError> {
    let mem_properties = unsafe { instance.get_physical_device_memory_properties(physical_device) };

    for i in 0..mem_properties.memory_type_count {
        if (type_filter & (1 << i)) != 0
            && mem_properties.memory_types[i as usize]
                .property_flags
                .contains(properties)
        {
            return Ok(i);
        }
    }

    Err(MemoryError::FindSuitableMemoryTypeFailed)
}

/// Creates an image and binds fresh device memory to it. With `dedicated`
/// set, the NV dedicated-allocation structs are chained onto both the image
/// and the allocation; the logical device must have enabled the extension.
pub fn create_image_with_memory(
    instance: &ash::Instance,
    physical_device: vk::PhysicalDevice,
    device: &ash::Device,
    image_info: &vk::ImageCreateInfo,
    memory_flags: vk::MemoryPropertyFlags,
    dedicated: bool,
) -> Result<(vk::Image, vk::DeviceMemory), MemoryError> {
    let mut dedicated_image_info =
        vk::DedicatedAllocationImageCreateInfoNV::default().dedicated_allocation(true);
    let create_info = if dedicated {
        (*image_info).push_next(&mut dedicated_image_info)
    } else {
        *image_info
    };

    let image = unsafe {
        device
            .create_image(&create_info, None)
            .map_err(|e| MemoryError::CreateImageFailed(e.to_string()))?
    };

    let mem_requirements = unsafe { device.get_image_memory_requirements(image) };

    let mem_type_index = find_memory_type(
        instance,
        physical_device,
        mem_requirements.memory_type_bits,
        memory_flags,
    )?;

    let mut dedicated_alloc_info =
        vk::DedicatedAllocationMemoryAllocateInfoNV::default().image(image);
    let alloc_info = vk::MemoryAllocateInfo::default()
        .allocation_size(mem_requirements.size)
        .memory_type_index(mem_type_index);
    let alloc_info = if dedicated {
        alloc_info.push_next(&mut dedicated_alloc_info)
    } else {
        alloc_info
    };

    let memory = unsafe {
        device
            .allocate_memory(&alloc_info, None)
            .map_err(|e| MemoryError::AllocateMemoryFailed(e.to_string()))?
    };

    unsafe {
        device
            .bind_image_memory(image, memory, 0)
            .map_err(|e| MemoryError::BindMemoryToImageFailed(e.to_string()))?;
    }

    Ok((image, memory))
}

pub fn create_buffer_with_memory(
    instance: &ash::Instance,
    physical_device: vk::PhysicalDevice,
    device: &ash::Device,
    size: vk::DeviceSize,
    usage: vk::BufferUsageFlags,
    memory_properties: vk::MemoryPropertyFlags,
) -> Result<(vk::Buffer, vk::DeviceMemory), MemoryError> {
    let buffer_info = vk::BufferCreateInfo::default()
        .size(size)
        .usage(usage)
        .sharing_mode(vk::SharingMode::EXCLUSIVE);

    let buffer = unsafe { device.create_buffer(&buffer_info, None) }
        .map_err(|e| MemoryError::CreateBufferFailed(e.to_string()))?;

    let mem_requirements = unsafe { device.get_buffer_memory_requirements(buffer) };

    let mem_type_index = find_memory_type(
        instance,
        physical_device,
        mem_requirements.memory_type_bits,
        memory_properties,
    )?;

    let alloc_info = vk::MemoryAllocateInfo::default()
        .allocation_size(mem_requirements.size)
        .memory_type_index(mem_type_index);

    let memory = unsafe { device.allocate_memory(&alloc_info, None) }
        .map_err(|e| MemoryError::AllocateMemoryFailed(e.to_string()))?;

    unsafe {
        device
            .bind_buffer_memory(buffer, memory, 0)
            .map_err(|e| MemoryError::BindMemoryToBufferFailed(e.to_string()))?;
    }

    Ok((buffer, memory))
}

/// Copies a full Pod slice into host-visible memory.
pub fn write_mapped<T: bytemuck::Pod>(
    device: &ash::Device,
    memory: vk::DeviceMemory,
    data: &[T],
) -> Result<(), MemoryError> {
    let bytes: &[u8] = bytemuck::cast_slice(data);
    unsafe {
        let ptr = device
            .map_memory(
                memory,
                0,
                bytes.len() as vk::DeviceSize,
                vk::MemoryMapFlags::empty(),
            )
            .map_err(|e| MemoryError::MapMemoryFailed(e.to_string()))?;
        std::ptr::copy_nonoverlapping(bytes.as_ptr(), ptr as *mut u8, bytes.len());
        device.unmap_memory(memory);
    }
    Ok(())
}

/// Records commands into a one-shot buffer on `pool`, submits on `queue` and
/// blocks on a fence until the GPU is done. Load-time only.
pub fn submit_one_time_commands<F>(
    device: &ash::Device,
    pool: vk::CommandPool,
    queue: vk::Queue,
    record: F,
) -> Result<(), MemoryError>
where
    F: FnOnce(vk::CommandBuffer),
{
    let alloc_info = vk::CommandBufferAllocateInfo::default()
        .command_pool(pool)
        .level(vk::CommandBufferLevel::PRIMARY)
        .command_buffer_count(1);
    let command_buffer = unsafe {
        device
            .allocate_command_buffers(&alloc_info)
            .map_err(|e| MemoryError::RecordUploadFailed(e.to_string()))?[0]
    };

    let begin_info = vk::CommandBufferBeginInfo::default()
        .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
    unsafe {
        device
            .begin_command_buffer(command_buffer, &begin_info)
            .map_err(|e| MemoryError::RecordUploadFailed(e.to_string()))?;
    }

    record(command_buffer);

    unsafe {
        device
            .end_command_buffer(command_buffer)
            .map_err(|e| MemoryError::RecordUploadFailed(e.to_string()))?;
    }

    let fence_info = vk::FenceCreateInfo::default();
    let fence = unsafe {
        device
            .create_fence(&fence_info, None)
            .map_err(|e| MemoryError::SubmitUploadFailed(e.to_string()))?
    };

    let command_buffers = [command_buffer];
    let submit_info = vk::SubmitInfo::default().command_buffers(&command_buffers);

    let result = unsafe {
        device
            .queue_submit(queue, std::slice::from_ref(&submit_info), fence)
            .and_then(|_| device.wait_for_fences(&[fence], true, u64::MAX))
            .map_err(|e| MemoryError::SubmitUploadFailed(e.to_string()))
    };

    unsafe {
        device.destroy_fence(fence, None);
        device.free_command_buffers(pool, &command_buffers);
    }

    result
}

/// Uploads a Pod slice through a staging buffer into a device-local buffer
/// with `usage | TRANSFER_DST`. Returns the device-local buffer and memory.
pub fn upload_device_local_buffer<T: bytemuck::Pod>(
    instance: &ash::Instance,
    physical_device: vk::PhysicalDevice,
    device: &ash::Device,
    pool: vk::CommandPool,
    queue: vk::Queue,
    data: &[T],
    usage: vk::BufferUsageFlags,
) -> Result<(vk::Buffer, vk::DeviceMemory), MemoryError> {
    let size = std::mem::size_of_val(data) as vk::DeviceSize;

    let (staging_buffer, staging_memory) = create_buffer_with_memory(
        instance,
        physical_device,
        device,
        size,
        vk::BufferUsageFlags::TRANSFER_SRC,
        vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
    )?;
    write_mapped(device, staging_memory, data)?;

    let (buffer, memory) = create_buffer_with_memory(
        instance,
        physical_device,
        device,
        size,
        usage | vk::BufferUsageFlags::TRANSFER_DST,
        vk::MemoryPropertyFlags::DEVICE_LOCAL,
    )?;

    let copy_result = submit_one_time_commands(device, pool, queue, |cmd| {
        let region = vk::BufferCopy::default().size(size);
        unsafe {
            device.cmd_copy_buffer(cmd, staging_buffer, buffer, std::slice::from_ref(&region));
        }
    });

    unsafe {
        device.destroy_buffer(staging_buffer, None);
        device.free_memory(staging_memory, None);
    }

    if let Err(e) = copy_result {
        unsafe {
            device.destroy_buffer(buffer, None);
            device.free_memory(memory, None);
        }
        return Err(e);
    }

    Ok((buffer, memory))
}
