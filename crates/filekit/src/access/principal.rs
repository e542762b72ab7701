//! User and group lookup.

use super::Principal;
use crate::error::{Error, Result};

/// Resolve an owner to a numeric uid.
pub fn resolve_uid(owner: &Principal) -> Result<u32> {
    match owner {
        Principal::Id(id) => Ok(*id),
        Principal::Name(name) => match name.parse::<u32>() {
            Ok(id) => Ok(id),
            Err(_) => lookup_user(name)?.ok_or_else(|| Error::NoSuchUser(name.clone())),
        },
    }
}

/// Resolve a group to a numeric gid.
pub fn resolve_gid(group: &Principal) -> Result<u32> {
    match group {
        Principal::Id(id) => Ok(*id),
        Principal::Name(name) => match name.parse::<u32>() {
            Ok(id) => Ok(id),
            Err(_) => lookup_group(name)?.ok_or_else(|| Error::NoSuchGroup(name.clone())),
        },
    }
}

#[cfg(unix)]
const INITIAL_BUFFER: usize = 16 * 1024;
#[cfg(unix)]
const MAX_BUFFER: usize = 1024 * 1024;

#[cfg(unix)]
fn lookup_user(name: &str) -> Result<Option<u32>> {
    use std::ffi::CString;

    let c_name = CString::new(name).map_err(|e| Error::Lookup(format!("invalid user name: {e}")))?;
    let mut buffer = vec![0u8; INITIAL_BUFFER];

    loop {
        let mut entry: libc::passwd = unsafe { std::mem::zeroed() };
        let mut result: *mut libc::passwd = std::ptr::null_mut();
        let status = unsafe {
            libc::getpwnam_r(
                c_name.as_ptr(),
                &mut entry,
                buffer.as_mut_ptr().cast::<libc::c_char>(),
                buffer.len(),
                &mut result,
            )
        };

        if status == libc::ERANGE && buffer.len() < MAX_BUFFER {
            buffer.resize(buffer.len() * 2, 0);
            continue;
        }
        if status != 0 {
            return Err(Error::Lookup(format!(
                "getpwnam_r failed: {}",
                std::io::Error::from_raw_os_error(status)
            )));
        }
        if result.is_null() {
            return Ok(None);
        }
        return Ok(Some(entry.pw_uid));
    }
}

#[cfg(unix)]
fn lookup_group(name: &str) -> Result<Option<u32>> {
    use std::ffi::CString;

    let c_name =
        CString::new(name).map_err(|e| Error::Lookup(format!("invalid group name: {e}")))?;
    let mut buffer = vec![0u8; INITIAL_BUFFER];

    loop {
        let mut entry: libc::group = unsafe { std::mem::zeroed() };
        let mut result: *mut libc::group = std::ptr::null_mut();
        let status = unsafe {
            libc::getgrnam_r(
                c_name.as_ptr(),
                &mut entry,
                buffer.as_mut_ptr().cast::<libc::c_char>(),
                buffer.len(),
                &mut result,
            )
        };

        if status == libc::ERANGE && buffer.len() < MAX_BUFFER {
            buffer.resize(buffer.len() * 2, 0);
            continue;
        }
        if status != 0 {
            return Err(Error::Lookup(format!(
                "getgrnam_r failed: {}",
                std::io::Error::from_raw_os_error(status)
            )));
        }
        if result.is_null() {
            return Ok(None);
        }
        return Ok(Some(entry.gr_gid));
    }
}

#[cfg(not(unix))]
fn lookup_user(_name: &str) -> Result<Option<u32>> {
    Err(Error::Unsupported("user lookup by name"))
}

#[cfg(not(unix))]
fn lookup_group(_name: &str) -> Result<Option<u32>> {
    Err(Error::Unsupported("group lookup by name"))
}
