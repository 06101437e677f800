//! `Java_com_hypnotic_vrreceiver_MainActivity_*` entry points.
//!
//! The activity owns the bridge through an opaque `long`. A zero handle is
//! ignored by every callback.

use std::ffi::c_void;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::ptr::NonNull;
use std::sync::Arc;

use jni::objects::{JByteArray, JObject, JString, ReleaseMode};
use jni::sys::{jint, jlong};
use jni::JNIEnv;
use ndk::native_window::NativeWindow;
use raw_window_handle::{
    AndroidDisplayHandle, AndroidNdkWindowHandle, DisplayHandle, HandleError, HasDisplayHandle,
    HasWindowHandle, RawDisplayHandle, RawWindowHandle, WindowHandle,
};

use vrlink_core::{ContextStage, StereoError, StereoResult, ViewerConfig};
use vrlink_render::{WgpuBackend, WgpuTarget};

use crate::bridge::ViewerBridge;

type AndroidBridge = ViewerBridge<WgpuBackend>;

/// Owns an `ANativeWindow` reference for as long as the surface lives.
struct AndroidSurface {
    window: NativeWindow,
}

impl HasWindowHandle for AndroidSurface {
    fn window_handle(&self) -> Result<WindowHandle<'_>, HandleError> {
        let ptr: NonNull<c_void> = self.window.ptr().cast();
        let raw = RawWindowHandle::AndroidNdk(AndroidNdkWindowHandle::new(ptr));
        // SAFETY: the window reference is held by `self` for the handle's lifetime.
        Ok(unsafe { WindowHandle::borrow_raw(raw) })
    }
}

impl HasDisplayHandle for AndroidSurface {
    fn display_handle(&self) -> Result<DisplayHandle<'_>, HandleError> {
        let raw = RawDisplayHandle::Android(AndroidDisplayHandle::new());
        // SAFETY: the Android display handle carries no pointers.
        Ok(unsafe { DisplayHandle::borrow_raw(raw) })
    }
}

/// Run a callback, logging its error and swallowing any panic so it never
/// unwinds into the JVM.
fn guarded<R>(name: &str, fallback: R, f: impl FnOnce() -> StereoResult<R>) -> R {
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(Ok(value)) => value,
        Ok(Err(err)) => {
            if err.is_transient() {
                tracing::debug!(callback = name, error = %err, "callback failed");
            } else {
                tracing::error!(callback = name, error = %err, "callback failed");
            }
            fallback
        }
        Err(_) => {
            tracing::error!(callback = name, "callback panicked");
            fallback
        }
    }
}

/// # Safety
/// `handle` must be zero or a value returned by `nativeOnCreate` that has not
/// been passed to `nativeOnDestroy`.
unsafe fn bridge<'a>(handle: jlong) -> Option<&'a AndroidBridge> {
    (handle as *const AndroidBridge).as_ref()
}

fn read_bytes(
    env: &mut JNIEnv,
    array: &JByteArray,
    f: impl FnOnce(&[u8]) -> StereoResult<()>,
) -> StereoResult<()> {
    if array.is_null() {
        return f(&[]);
    }
    // SAFETY: the array is not touched from Java while the callback runs and
    // the elements are released without copy-back when the guard drops.
    let elements = unsafe { env.get_array_elements(array, ReleaseMode::NoCopyBack) }
        .map_err(|e| StereoError::Decode(format!("byte array unavailable: {e}")))?;
    let signed: &[i8] = &elements;
    f(bytemuck::cast_slice(signed))
}

fn read_config(env: &mut JNIEnv, config: &JString) -> ViewerConfig {
    if config.is_null() {
        return ViewerConfig::default();
    }
    let toml = match env.get_string(config) {
        Ok(s) => String::from(s),
        Err(e) => {
            tracing::warn!(error = %e, "config string unreadable, using defaults");
            return ViewerConfig::default();
        }
    };
    match ViewerConfig::from_toml_str(&toml) {
        Ok(config) => config,
        Err(e) => {
            tracing::warn!(error = %e, "config rejected, using defaults");
            ViewerConfig::default()
        }
    }
}

#[no_mangle]
pub extern "system" fn Java_com_hypnotic_vrreceiver_MainActivity_nativeOnCreate<'local>(
    mut env: JNIEnv<'local>,
    _this: JObject<'local>,
    config: JString<'local>,
) -> jlong {
    let config = read_config(&mut env, &config);
    crate::init_logging(&config.logging.filter);
    guarded("nativeOnCreate", 0, || {
        let bridge = AndroidBridge::new(config)?;
        Ok(Box::into_raw(Box::new(bridge)) as jlong)
    })
}

#[no_mangle]
pub extern "system" fn Java_com_hypnotic_vrreceiver_MainActivity_nativeOnDestroy<'local>(
    _env: JNIEnv<'local>,
    _this: JObject<'local>,
    handle: jlong,
) {
    if handle == 0 {
        return;
    }
    guarded("nativeOnDestroy", (), || {
        // SAFETY: the activity hands the handle back exactly once.
        drop(unsafe { Box::from_raw(handle as *mut AndroidBridge) });
        Ok(())
    });
}

#[no_mangle]
pub extern "system" fn Java_com_hypnotic_vrreceiver_MainActivity_nativeOnSurfaceCreated<'local>(
    env: JNIEnv<'local>,
    _this: JObject<'local>,
    handle: jlong,
    surface: JObject<'local>,
) {
    let Some(bridge) = (unsafe { bridge(handle) }) else {
        return;
    };
    guarded("nativeOnSurfaceCreated", (), || {
        // SAFETY: `surface` is a live android.view.Surface for this call.
        let window = unsafe { NativeWindow::from_surface(env.get_raw(), surface.as_raw()) }
            .ok_or_else(|| {
                StereoError::context(
                    ContextStage::CreateSurface,
                    "no native window for surface",
                )
            })?;
        let width = u32::try_from(window.width()).unwrap_or(0);
        let height = u32::try_from(window.height()).unwrap_or(0);
        let target = WgpuTarget {
            window: Arc::new(AndroidSurface { window }),
            width,
            height,
        };
        bridge.on_surface_created(target)
    });
}

#[no_mangle]
pub extern "system" fn Java_com_hypnotic_vrreceiver_MainActivity_nativeOnSurfaceChanged<'local>(
    _env: JNIEnv<'local>,
    _this: JObject<'local>,
    handle: jlong,
    width: jint,
    height: jint,
) {
    if let Some(bridge) = unsafe { bridge(handle) } {
        guarded("nativeOnSurfaceChanged", (), || {
            bridge.on_surface_changed(width, height)
        });
    }
}

#[no_mangle]
pub extern "system" fn Java_com_hypnotic_vrreceiver_MainActivity_nativeOnDrawFrame<'local>(
    _env: JNIEnv<'local>,
    _this: JObject<'local>,
    handle: jlong,
) {
    if let Some(bridge) = unsafe { bridge(handle) } {
        guarded("nativeOnDrawFrame", (), || bridge.on_draw_frame());
    }
}

#[no_mangle]
pub extern "system" fn Java_com_hypnotic_vrreceiver_MainActivity_nativeOnFrameReceived<'local>(
    mut env: JNIEnv<'local>,
    _this: JObject<'local>,
    handle: jlong,
    eye: jint,
    bytes: JByteArray<'local>,
    size: jint,
) {
    if let Some(bridge) = unsafe { bridge(handle) } {
        guarded("nativeOnFrameReceived", (), || {
            read_bytes(&mut env, &bytes, |data| {
                bridge.on_frame_received(eye, data, size)
            })
        });
    }
}

#[no_mangle]
pub extern "system" fn Java_com_hypnotic_vrreceiver_MainActivity_nativeOnStereoFrameReceived<
    'local,
>(
    mut env: JNIEnv<'local>,
    _this: JObject<'local>,
    handle: jlong,
    bytes: JByteArray<'local>,
    size: jint,
) {
    if let Some(bridge) = unsafe { bridge(handle) } {
        guarded("nativeOnStereoFrameReceived", (), || {
            read_bytes(&mut env, &bytes, |data| {
                bridge.on_stereo_frame_received(data, size)
            })
        });
    }
}

#[no_mangle]
pub extern "system" fn Java_com_hypnotic_vrreceiver_MainActivity_nativeUpdateTexture<'local>(
    mut env: JNIEnv<'local>,
    _this: JObject<'local>,
    handle: jlong,
    left: JByteArray<'local>,
    left_size: jint,
    right: JByteArray<'local>,
    right_size: jint,
) {
    if let Some(bridge) = unsafe { bridge(handle) } {
        guarded("nativeUpdateTexture", (), || {
            let left_result = read_bytes(&mut env, &left, |data| {
                bridge.on_frame_received(0, data, left_size)
            });
            let right_result = read_bytes(&mut env, &right, |data| {
                bridge.on_frame_received(1, data, right_size)
            });
            left_result.and(right_result)
        });
    }
}

#[no_mangle]
pub extern "system" fn Java_com_hypnotic_vrreceiver_MainActivity_nativeOnSurfaceDestroyed<'local>(
    _env: JNIEnv<'local>,
    _this: JObject<'local>,
    handle: jlong,
) {
    if let Some(bridge) = unsafe { bridge(handle) } {
        guarded("nativeOnSurfaceDestroyed", (), || bridge.on_surface_destroyed());
    }
}
