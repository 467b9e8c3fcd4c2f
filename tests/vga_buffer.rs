#![no_std]
#![no_main]
#![feature(custom_test_frameworks)]
#![test_runner(quantum_os::test_runner)]
#![reexport_test_harness_main = "test_main"]

use bootloader::{entry_point, BootInfo};
use core::panic::PanicInfo;
use quantum_os::{println, serial_println};

entry_point!(test_kernel_main);

fn test_kernel_main(boot_info: &'static BootInfo) -> ! {
    quantum_os::init::initialize_vga();
    quantum_os::init::initialize_serial();
    let _ = boot_info;
    test_main();
    quantum_os::hlt_loop();
}

#[panic_handler]
fn panic(info: &PanicInfo) -> ! {
    quantum_os::test_panic_handler(info)
}

#[test_case]
fn test_println_simple() {
    println!("test_println_simple output");
}

#[test_case]
fn test_println_many() {
    for _ in 0..200 {
        println!("test_println_many output");
    }
}
