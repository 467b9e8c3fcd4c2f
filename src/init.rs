// src/init.rs

//! Kernel initialization module
//!
//! This module handles all kernel subsystem initialization including:
//! - Serial port (COM1) setup and configuration
//! - VGA text mode initialization
//! - Hardware verification
//!
//! Initialization functions are called early in the kernel boot process
//! to prepare the system for operation.

use crate::serial::InitError;
use crate::serial_println;
use crate::vga_buffer::ColorCode;

use bootloader::bootinfo::BootInfo;
use core::sync::atomic::Ordering;

/// Minimum kernel heap size (1 MiB). Generous for a scheduler core with
/// no filesystem cache or userland allocator riding on top of it.
const HEAP_SIZE: usize = 1024 * 1024;

/// Timer tick rate. One tick is one scheduling quantum unit (§4.E); a
/// kernel process's default quantum of 1 tick at 100 Hz is a 10 ms
/// slice, matching the host kernel's existing PIT default.
const TIMER_HZ: u32 = 100;

/// Initialize the serial port (COM1)
///
/// Configures the serial port for debugging output. If the port is already
/// initialized (e.g., by bootloader or previous initialization), this function
/// will skip hardware setup and only log a message.
///
/// # Hardware Detection
///
/// This function gracefully handles systems without COM1 hardware.
/// On modern motherboards without physical serial ports, the kernel
/// will continue to function normally using only VGA output.
///
/// # Examples
///
/// ```
/// use crate::init::initialize_serial;
///
/// initialize_serial();
/// ```
pub fn initialize_serial() {
    match crate::serial::init() {
        Ok(()) => {
            serial_println!("=== Rust OS Kernel Started ===");
            serial_println!("Serial port initialized (38400 baud, 8N1, FIFO checked)");
        }
        Err(InitError::AlreadyInitialized) => {
            serial_println!("Serial port already initialized; skipping hardware setup");
        }
        Err(InitError::PortNotPresent) => {
            // No serial port - this is normal on modern systems
            // VGA output will still work, so no action needed
            // We intentionally don't panic here
        }
        Err(InitError::Timeout) => {
            // Port exists but not responding
            // Continue anyway - not critical for kernel operation
        }
    }

    debug_assert!(crate::serial::is_initialized());
}

/// Initialize the VGA text mode
///
/// Clears the screen, sets the default color scheme, and prepares
/// the VGA buffer for output. Also logs initialization status to
/// the serial console.
///
/// # Examples
///
/// ```
/// use crate::init::initialize_vga;
///
/// initialize_vga();
/// ```
pub fn initialize_vga() {
    crate::vga_buffer::clear();
    crate::vga_buffer::set_color(ColorCode::normal());
    serial_println!("VGA text mode initialized (80x25, color support)");
    serial_println!("SAFE: Using Mutex-protected VGA writer (interrupt-safe!)");
}

/// Enter the idle loop and halt the CPU
///
/// This function puts the CPU into a low-power state using the `hlt`
/// instruction. The CPU will wake up on interrupts and immediately
/// halt again, creating an efficient idle loop.
///
/// # Note
///
/// This function never returns (`-> !`) as the kernel should remain
/// in the idle loop until a hardware interrupt or reset occurs.
///
/// # Examples
///
/// ```
/// use crate::init::halt_forever;
///
/// // After kernel initialization
/// halt_forever();
/// ```
pub fn halt_forever() -> ! {
    loop {
        x86_64::instructions::hlt();
    }
}

/// Full kernel bring-up: hardware drivers, paging, the heap, then the
/// scheduler. Never returns — the last step jumps into the idle
/// process via [`crate::kernel::scheduler::initialize`].
///
/// # Safety
///
/// Must run exactly once, as the very first thing `kernel_main` does,
/// with `boot_info` describing the machine this kernel actually booted
/// on.
pub unsafe fn initialize_all(boot_info: &'static BootInfo) -> ! {
    initialize_serial();
    initialize_vga();

    crate::kernel::mm::PHYS_MEM_OFFSET.store(boot_info.physical_memory_offset, Ordering::Relaxed);

    unsafe {
        crate::kernel::mm::LockedFrameAllocator::install(&boot_info.memory_map);
    }

    let (heap_phys, heap_size) = crate::kernel::mm::find_heap_region(&boot_info.memory_map, HEAP_SIZE as u64)
        .expect("no usable memory region large enough for the kernel heap");
    let heap_virt = crate::kernel::mm::VirtAddr::new(
        heap_phys.as_usize() + boot_info.physical_memory_offset as usize,
    );
    unsafe {
        crate::init_heap(heap_virt, heap_size).expect("heap must not already be initialized");
    }

    crate::arch::x86_64::init_gdt();
    crate::arch::x86_64::init_idt();

    unsafe {
        crate::arch::x86_64::pic::PICS.lock().initialize();
        crate::arch::x86_64::pic::PICS.lock().unmask_irq(0);
    }
    crate::kernel::driver::pit::PIT
        .lock()
        .set_frequency(TIMER_HZ)
        .expect("PIT frequency must be representable in the divisor register");

    unsafe {
        crate::kernel::scheduler::initialize();
    }
}
