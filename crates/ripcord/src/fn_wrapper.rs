// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

/// Generates a cloneable, thread-safe wrapper around a user-provided callback.
///
/// ```rust,ignore
/// define_fn_wrapper!(OnRetry(Fn(args: &OnRetryArgs)));
/// define_fn_wrapper!(Retryable(Fn(failure: &Failure) -> bool));
/// ```
///
/// The generated type stores the callback in an `Arc<dyn Fn ...>` and provides `new`, `call`,
/// `Clone` and a `Debug` implementation that prints only the type name.
macro_rules! define_fn_wrapper {
    ($name:ident(Fn($($param_name:ident: $param_ty:ty),*) -> $return_ty:ty)) => {
        pub(crate) struct $name(std::sync::Arc<dyn Fn($($param_ty),*) -> $return_ty + Send + Sync>);

        impl $name {
            pub(crate) fn new<F>(callback: F) -> Self
            where
                F: Fn($($param_ty),*) -> $return_ty + Send + Sync + 'static,
            {
                Self(std::sync::Arc::new(callback))
            }

            pub(crate) fn call(&self, $($param_name: $param_ty),*) -> $return_ty {
                (self.0)($($param_name),*)
            }
        }

        impl Clone for $name {
            fn clone(&self) -> Self {
                Self(std::sync::Arc::clone(&self.0))
            }
        }

        impl std::fmt::Debug for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.debug_struct(stringify!($name)).finish()
            }
        }
    };

    ($name:ident(Fn($($param_name:ident: $param_ty:ty),*))) => {
        $crate::fn_wrapper::define_fn_wrapper!($name(Fn($($param_name: $param_ty),*) -> ()));
    };
}

pub(crate) use define_fn_wrapper;

#[cfg_attr(coverage_nightly, coverage(off))]
#[cfg(test)]
mod tests {
    use std::fmt::Debug;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    define_fn_wrapper!(Doubler(Fn(value: u32) -> u32));
    define_fn_wrapper!(Observer(Fn(value: u32)));

    #[test]
    fn static_assertions() {
        static_assertions::assert_impl_all!(Doubler: Send, Sync, Debug, Clone);
        static_assertions::assert_impl_all!(Observer: Send, Sync, Debug, Clone);
    }

    #[test]
    fn call_ok() {
        let wrapper = Doubler::new(|value| value * 2);
        assert_eq!(wrapper.call(21), 42);

        let cloned = wrapper.clone();
        assert_eq!(cloned.call(4), 8);
    }

    #[test]
    fn unit_return_ok() {
        let seen = Arc::new(AtomicU32::new(0));
        let seen_clone = Arc::clone(&seen);
        let wrapper = Observer::new(move |value| {
            seen_clone.store(value, Ordering::SeqCst);
        });

        wrapper.call(7);

        assert_eq!(seen.load(Ordering::SeqCst), 7);
    }

    #[test]
    fn debug_ok() {
        let wrapper = Doubler::new(|value| value);

        assert_eq!(format!("{wrapper:?}"), "Doubler");
    }
}
