use crate::plan::generation::StringDedupMode;
use std::default::Default;

/// The default number of tasks a worker processes between two checks for cancellation and
/// SATB buffers.
pub const DEFAULT_MARK_LOOP_STRIDE: usize = 1000;
/// The default number of array elements scanned by one array chunk task.
pub const DEFAULT_ARRAY_CHUNK_SIZE: usize = 2048;
/// The default capacity of a thread-local SATB buffer.
pub const DEFAULT_SATB_BUFFER_SIZE: usize = 1024;
/// The default minimum old generation growth (in percent of live data) before an old collection
/// is triggered.
pub const DEFAULT_MIN_OLD_GEN_GROWTH_PERCENT: usize = 12;

fn always_valid<T>(_: &T) -> bool {
    true
}

macro_rules! options {
    ($($(#[$outer:meta])* $name:ident: $type:ty[$validator:expr] = $default:expr),*,) => [
        options!($($(#[$outer])* $name: $type[$validator] = $default),*);
    ];
    ($($(#[$outer:meta])* $name:ident: $type:ty[$validator:expr] = $default:expr),*) => [
        /// Tunables of the collector. The default value of every option can be overridden by
        /// an environment variable with the prefix `GENCOORD_`, e.g. `GENCOORD_THREADS=4`.
        #[derive(Clone, Debug)]
        pub struct Options {
            $($(#[$outer])* pub $name: $type),*
        }
        impl Options {
            /// Set an option by its name. Return `false` (and keep the current value) if the
            /// value cannot be parsed or does not pass validation.
            pub fn set_from_str(&mut self, s: &str, val: &str) -> bool {
                match s {
                    // Parse the given value from str (by env vars or by calling process()) to the right type
                    $(stringify!($name) => if let Ok(ref val) = val.parse::<$type>() {
                        // Validate
                        let validate_fn = $validator;
                        let is_valid = validate_fn(val);
                        if is_valid {
                            // Only set value if valid.
                            self.$name = val.clone();
                        } else {
                            warn!("Unable to set {}={:?}. Invalid value. Default value will be used.", s, val);
                        }
                        is_valid
                    } else {
                        warn!("Unable to set {}={:?}. Cant parse value. Default value will be used.", s, val);
                        false
                    })*
                    _ => {
                        warn!("Unknown option {}", s);
                        false
                    }
                }
            }
        }
        impl Default for Options {
            fn default() -> Self {
                let mut options = Options {
                    $($name: $default),*
                };

                // If we have env vars that start with GENCOORD_ and match any option (such as GENCOORD_THREADS),
                // we set the option to its value (if it is a valid value). Otherwise, use the default value.
                const PREFIX: &str = "GENCOORD_";
                for (key, val) in std::env::vars() {
                    // strip the prefix, and get the lower case string
                    if let Some(rest_of_key) = key.strip_prefix(PREFIX) {
                        let lowercase: &str = &rest_of_key.to_lowercase();
                        match lowercase {
                            $(stringify!($name) => { options.set_from_str(lowercase, &val); },)*
                            _ => {}
                        }
                    }
                }
                options
            }
        }
    ]
}

options! {
    /// Number of GC worker threads.
    threads:                    usize            [|v: &usize| *v > 0] = num_cpus::get(),
    /// Number of tasks processed between two checks for cancellation and pending SATB buffers.
    mark_loop_stride:           usize            [|v: &usize| *v > 0] = DEFAULT_MARK_LOOP_STRIDE,
    /// Arrays longer than this are scanned in chunks of this many elements.
    array_chunk_size:           usize            [|v: &usize| *v > 0] = DEFAULT_ARRAY_CHUNK_SIZE,
    /// Capacity of a thread-local SATB buffer before it is handed to the completed set.
    satb_buffer_size:           usize            [|v: &usize| *v > 0] = DEFAULT_SATB_BUFFER_SIZE,
    /// Should concurrent workers join the suspendible thread set and leave it while they wait
    /// for termination?
    suspendible_workers:        bool             [always_valid] = false,
    /// String deduplication mode used by marking.
    string_dedup:               StringDedupMode  [always_valid] = StringDedupMode::NoDedup,
    /// Minimum growth of the old generation, in percent of its live data, before an old cycle
    /// is triggered.
    min_old_gen_growth_percent: usize            [|v: &usize| (1..=100).contains(v)] = DEFAULT_MIN_OLD_GEN_GROWTH_PERCENT,
    /// Check the preconditions of every old generation transition.
    verify_old_transitions:     bool             [always_valid] = cfg!(debug_assertions) || cfg!(feature = "verify_transitions"),
}
