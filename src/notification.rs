use std::sync::Arc;

/// A closure invoked for every entry forced out of a size-bounded map.
///
/// The listener runs on the thread performing the insert that exceeded the
/// target size, after the victim has been removed from the map and outside all
/// internal locks. It must not call back into the same map.
pub type EvictionListener<K, V> = Arc<dyn Fn(Arc<K>, V) + Send + Sync + 'static>;

/// Invokes the eviction listener, reporting a listener panic before letting it
/// propagate to the inserting caller.
pub(crate) struct RemovalNotifier<K, V> {
    listener: EvictionListener<K, V>,
    #[cfg(feature = "logging")]
    map_name: Option<String>,
}

impl<K, V> RemovalNotifier<K, V> {
    pub(crate) fn new(listener: EvictionListener<K, V>, _map_name: Option<String>) -> Self {
        Self {
            listener,
            #[cfg(feature = "logging")]
            map_name: _map_name,
        }
    }

    pub(crate) fn notify(&self, key: Arc<K>, value: V) {
        use std::panic::{catch_unwind, resume_unwind, AssertUnwindSafe};

        let listener_clo = || (self.listener)(key, value);

        // The victim is already gone from the map, so a panicking listener
        // cannot leave it reachable; the panic is reported and re-raised to
        // the caller of the triggering insert.
        if let Err(payload) = catch_unwind(AssertUnwindSafe(listener_clo)) {
            #[cfg(feature = "logging")]
            log_panic(&*payload, self.map_name.as_deref());
            resume_unwind(payload);
        }
    }
}

#[cfg(feature = "logging")]
fn log_panic(payload: &(dyn std::any::Any + Send + 'static), map_name: Option<&str>) {
    // Try to downcast the payload into &str or String.
    let message: Option<std::borrow::Cow<'_, str>> =
        (payload.downcast_ref::<&str>().map(|s| (*s).into()))
            .or_else(|| payload.downcast_ref::<String>().map(Into::into));

    let mn = map_name
        .map(|name| format!("[{name}] "))
        .unwrap_or_default();

    if let Some(m) = message {
        log::error!("{mn}The eviction listener panicked at '{m}'");
    } else {
        log::error!("{mn}The eviction listener panicked");
    }
}
