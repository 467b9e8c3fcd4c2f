//! Security validation and access control
//!
//! This module provides security checks for system calls and kernel operations.
//! It validates user-provided pointers, enforces access controls, and prevents
//! privilege escalation.
//!
//! # Overview
//!
//! The security module implements defense-in-depth by providing multiple
//! layers of validation:
//!
//! 1. **Address range validation** - Basic checks that pointers are in user space
//! 2. **Page mapping validation** - Verifies pages are actually mapped
//! 3. **Permission validation** - Checks read/write/execute permissions
//! 4. **Size validation** - Prevents integer overflow and excessive allocations
//!
//! # Usage
//!
//! System call handlers should validate all user-provided pointers:
//!
//! ```rust,ignore
//! pub fn sys_write(fd: u64, buf: u64, len: u64) -> SyscallResult {
//!     // Validate user buffer
//!     validate_user_read(buf, len)?;
//!     
//!     // Safe to use buffer
//!     let slice = unsafe { core::slice::from_raw_parts(buf as *const u8, len as usize) };
//!     // ...
//! }
//! ```

// Type alias for syscall results
type SyscallResult<T> = Result<T, i64>;

// Error codes (Linux-compatible)
const EFAULT: i64 = -14;   // Bad address
const EINVAL: i64 = -22;   // Invalid argument

/// User space address range
pub mod address_space {
    /// Start of user space
    pub const USER_START: u64 = 0x0000_0000_0000_0000;
    
    /// End of user space (exclusive)
    pub const USER_END: u64 = 0x0000_8000_0000_0000;
    
    /// Start of kernel space
    pub const KERNEL_START: u64 = 0xFFFF_8000_0000_0000;
    
    /// Size of user space
    pub const USER_SIZE: u64 = USER_END - USER_START;
}

/// Check if an address is in user space
///
/// # Arguments
/// * `addr` - Virtual address to check
///
/// # Returns
/// `true` if the address is in user space ([`address_space::USER_START`], [`address_space::USER_END`])
///
/// # Examples
/// ```rust,ignore
/// assert!(is_user_address(0x1000));
/// assert!(!is_user_address(0xFFFF_8000_0000_0000));
/// ```
#[inline]
pub const fn is_user_address(addr: u64) -> bool {
    addr < address_space::USER_END
}

/// Check if a memory range is entirely in user space
///
/// This function prevents:
/// - Integer overflow attacks (checked addition)
/// - Partial kernel access (validates entire range)
/// - Zero-length exploits (implicitly handled)
///
/// # Arguments
/// * `addr` - Start address
/// * `len` - Length in bytes
///
/// # Returns
/// `true` if the entire range [addr, addr+len) is in user space
///
/// # Security
///
/// This is a **critical security function**. It must:
/// - Check for integer overflow in addr + len
/// - Verify both start and end are in user space
/// - Handle edge cases (0-length, max address)
#[inline]
pub fn is_user_range(addr: u64, len: u64) -> bool {
    // Check for overflow
    let end = match addr.checked_add(len) {
        Some(e) => e,
        None => return false, // Overflow
    };
    
    // Check range is in user space
    is_user_address(addr) && is_user_address(end.saturating_sub(1))
}

/// Validate that a user pointer can be read from
///
/// # Arguments
/// * `ptr` - User-provided pointer
/// * `len` - Number of bytes to read
///
/// # Returns
/// * `Ok(())` - Pointer is valid for reading
/// * `Err(EFAULT)` - Invalid pointer or not mapped
/// * `Err(EINVAL)` - Invalid length
///
/// # Security
///
/// Checks:
/// 1. Pointer is in user space
/// 2. Range doesn't overflow
/// 3. TODO: Verify pages are mapped
/// 4. TODO: Verify pages have read permission
pub fn validate_user_read(ptr: u64, len: u64) -> SyscallResult<()> {
    // Check for zero-length (allowed, no-op)
    if len == 0 {
        return Ok(());
    }
    
    // Check null pointer
    if ptr == 0 {
        return Err(EFAULT);
    }
    
    // Check range is in user space
    if !is_user_range(ptr, len) {
        return Err(EFAULT);
    }
    
    // TODO: Phase 3 - Verify pages are actually mapped
    // TODO: Phase 3 - Verify pages have read permission
    
    Ok(())
}

/// Validate that a user pointer can be written to
///
/// # Arguments
/// * `ptr` - User-provided pointer
/// * `len` - Number of bytes to write
///
/// # Returns
/// * `Ok(())` - Pointer is valid for writing
/// * `Err(EFAULT)` - Invalid pointer or not mapped
/// * `Err(EINVAL)` - Invalid length
///
/// # Security
///
/// Checks:
/// 1. Pointer is in user space
/// 2. Range doesn't overflow
/// 3. TODO: Verify pages are mapped
/// 4. TODO: Verify pages have write permission
pub fn validate_user_write(ptr: u64, len: u64) -> SyscallResult<()> {
    // Check for zero-length (allowed, no-op)
    if len == 0 {
        return Ok(());
    }
    
    // Check null pointer
    if ptr == 0 {
        return Err(EFAULT);
    }
    
    // Check range is in user space
    if !is_user_range(ptr, len) {
        return Err(EFAULT);
    }
    
    // TODO: Phase 3 - Verify pages are actually mapped
    // TODO: Phase 3 - Verify pages have write permission
    
    Ok(())
}

/// Validate a user string pointer
///
/// This validates that a null-terminated string is entirely in user space.
///
/// # Arguments
/// * `ptr` - Pointer to null-terminated string
/// * `max_len` - Maximum length to scan (prevents infinite loops)
///
/// # Returns
/// * `Ok(len)` - String is valid, returns length (excluding null terminator)
/// * `Err(EFAULT)` - Invalid pointer
/// * `Err(EINVAL)` - String too long or not null-terminated
///
/// # Safety
///
/// This function must scan user memory to find the null terminator.
/// It's inherently slower than fixed-length validation.
pub fn validate_user_string(ptr: u64, max_len: usize) -> SyscallResult<usize> {
    if ptr == 0 {
        return Err(EFAULT);
    }
    
    if !is_user_address(ptr) {
        return Err(EFAULT);
    }
    
    // TODO: Implement actual string scanning
    // For now, just validate the maximum possible range
    validate_user_read(ptr, max_len as u64)?;
    
    // Placeholder: assume string is valid
    // Real implementation would scan for null terminator
    Ok(0)
}

/// Validate an array of user pointers
///
/// # Arguments
/// * `ptr` - Pointer to array of pointers
/// * `count` - Number of pointers in array
///
/// # Returns
/// * `Ok(())` - All pointers are valid
/// * `Err(EFAULT)` - Invalid pointer or array
pub fn validate_user_pointer_array(ptr: u64, count: usize) -> SyscallResult<()> {
    let len = count.checked_mul(8).ok_or(EINVAL)?; // 8 bytes per pointer on x86-64
    validate_user_read(ptr, len as u64)
}

/// Maximum reasonable allocation size (1GB)
///
/// This prevents:
/// - Out of memory attacks
/// - Integer overflow in size calculations
/// - Excessive resource consumption
pub const MAX_ALLOC_SIZE: u64 = 1024 * 1024 * 1024;

/// Validate an allocation size
///
/// # Arguments
/// `size` - Requested allocation size
///
/// # Returns
/// * `Ok(())` - Size is reasonable
/// * `Err(EINVAL)` - Size is zero or too large
pub fn validate_alloc_size(size: u64) -> SyscallResult<()> {
    if size == 0 {
        return Err(EINVAL);
    }
    
    if size > MAX_ALLOC_SIZE {
        return Err(EINVAL);
    }
    
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    
    #[test]
    fn test_is_user_address() {
        assert!(is_user_address(0));
        assert!(is_user_address(0x1000));
        assert!(is_user_address(0x7FFF_FFFF_FFFF));
        assert!(!is_user_address(0x8000_0000_0000));
        assert!(!is_user_address(0xFFFF_8000_0000_0000));
    }
    
    #[test]
    fn test_is_user_range() {
        assert!(is_user_range(0x1000, 0x1000));
        assert!(is_user_range(0, 0x1000));
        assert!(!is_user_range(0x7FFF_FFFF_F000, 0x2000)); // Crosses boundary
        assert!(!is_user_range(u64::MAX, 1)); // Overflow
    }
}
