//! # vrlink-android
//!
//! Native half of the Android VR receiver. The Java activity creates one
//! [`ViewerBridge`] through `nativeOnCreate`, keeps the returned handle and
//! passes it back on every lifecycle and frame callback.

pub mod bridge;

#[cfg(target_os = "android")]
mod jni_exports;

use std::sync::Once;

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

pub use bridge::ViewerBridge;

static LOGGING: Once = Once::new();

/// Install the global subscriber. Later calls are ignored.
///
/// `RUST_LOG` wins over `filter` when set. On Android events go to logcat
/// under the `vrlink` tag; elsewhere they go to stderr.
pub fn init_logging(filter: &str) {
    LOGGING.call_once(|| {
        let env_filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

        #[cfg(target_os = "android")]
        let output = paranoid_android::layer("vrlink");
        #[cfg(not(target_os = "android"))]
        let output = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

        if tracing_subscriber::registry()
            .with(env_filter)
            .with(output)
            .try_init()
            .is_err()
        {
            tracing::debug!("a global subscriber was already installed");
        }
    });
}
