// SPDX-License-Identifier: MPL-2.0

#![allow(unused)]

pub(crate) use std::sync::{Arc, Condvar, Mutex, MutexGuard, RwLock, Weak};

pub(crate) use bitflags::bitflags;
pub(crate) use log::{debug, error, info, trace, warn};

pub(crate) use crate::{
    error::{Errno, Error},
    return_errno, return_errno_with_message,
};
pub(crate) type Result<T> = std::result::Result<T, Error>;
