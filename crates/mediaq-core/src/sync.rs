//! `std::sync` まわりの小さなヘルパー

use std::sync::{Mutex, MutexGuard, PoisonError};

/// poison を伝播させずに lock する。
///
/// この crate の critical section は、panic しうる処理（observer 呼び出し）の
/// 前に状態を整合させている。poison された guard でもそのまま使える。
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
