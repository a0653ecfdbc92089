//! JNI bindings for the Android app.
//!
//! Each public function here corresponds to an `external fun` declaration
//! in NavBridge.kt. The function names follow JNI naming conventions:
//! Java_<package>_<class>_<method> with dots replaced by underscores.
//!
//! A session lives behind an opaque `jlong` handle created by
//! `createSession` and freed by `releaseSession`. Structured results cross
//! the boundary as JSON strings.

use std::time::Instant;

use jni::objects::{JByteArray, JClass, JString};
use jni::sys::{jboolean, jdouble, jint, jlong, jstring, JNI_FALSE, JNI_TRUE};
use jni::JNIEnv;
use log::{error, warn};

use crate::bearing::{CompassAccuracy, Heading};
use crate::companion;
use crate::config::{NavConfig, RadarConfig};
use crate::error::NavError;
use crate::geo::GeoPoint;
use crate::path::Path;
use crate::reroute::FollowTarget;
use crate::session::{Fix, NavSession};
use crate::track_state::SnoozeTicket;

fn init_logging() {
    #[cfg(target_os = "android")]
    android_logger::init_once(
        android_logger::Config::default()
            .with_max_level(log::LevelFilter::Debug)
            .with_tag("trailmatch"),
    );
}

fn read_string(env: &mut JNIEnv, value: &JString) -> Option<String> {
    if value.is_null() {
        return None;
    }
    env.get_string(value).ok().map(Into::into)
}

fn to_jstring(env: &mut JNIEnv, value: &str) -> jstring {
    env.new_string(value)
        .map(|s| s.into_raw())
        .unwrap_or(std::ptr::null_mut())
}

/// Borrow the session behind a handle.
///
/// # Safety
/// `handle` must be 0 or a value returned by `createSession` that has not
/// been released.
unsafe fn session<'a>(handle: jlong) -> Option<&'a mut NavSession> {
    (handle as *mut NavSession).as_mut()
}

fn build_session(gpx: &[u8], config_json: Option<&str>) -> Result<NavSession, NavError> {
    let config = match config_json {
        Some(json) if !json.trim().is_empty() => NavConfig::from_json(json)?,
        _ => NavConfig::default(),
    };
    let path = Path::from_gpx(gpx)?;
    Ok(NavSession::new(path, config))
}

/// Returns the library version.
/// Maps to: NavBridge.version() -> String
#[unsafe(no_mangle)]
pub extern "system" fn Java_com_trailmatch_app_NavBridge_version(
    mut env: JNIEnv,
    _class: JClass,
) -> jstring {
    to_jstring(&mut env, crate::VERSION)
}

/// Maps to: NavBridge.createSession(gpx: ByteArray, configJson: String?) -> Long
///
/// Returns 0 when the GPX cannot be read or holds no points.
#[unsafe(no_mangle)]
pub extern "system" fn Java_com_trailmatch_app_NavBridge_createSession(
    mut env: JNIEnv,
    _class: JClass,
    gpx: JByteArray,
    config_json: JString,
) -> jlong {
    init_logging();

    let bytes = match env.convert_byte_array(&gpx) {
        Ok(bytes) => bytes,
        Err(e) => {
            error!("failed to read GPX bytes: {e}");
            return 0;
        }
    };
    let config = read_string(&mut env, &config_json);

    match build_session(&bytes, config.as_deref()) {
        Ok(session) => Box::into_raw(Box::new(session)) as jlong,
        Err(e) => {
            error!("cannot start navigation: {e}");
            0
        }
    }
}

/// Maps to: NavBridge.releaseSession(handle: Long)
#[unsafe(no_mangle)]
pub extern "system" fn Java_com_trailmatch_app_NavBridge_releaseSession(
    _env: JNIEnv,
    _class: JClass,
    handle: jlong,
) {
    if handle != 0 {
        // SAFETY: the handle was produced by Box::into_raw in createSession.
        drop(unsafe { Box::from_raw(handle as *mut NavSession) });
    }
}

fn altitude(value: jdouble) -> Option<f64> {
    value.is_finite().then_some(value)
}

/// Maps to: NavBridge.processFix(handle, lat, lon, altitude, accuracy) -> String (snapshot JSON)
///
/// Pass NaN as `altitude` when the location has none.
#[unsafe(no_mangle)]
pub extern "system" fn Java_com_trailmatch_app_NavBridge_processFix(
    mut env: JNIEnv,
    _class: JClass,
    handle: jlong,
    lat: jdouble,
    lon: jdouble,
    altitude_m: jdouble,
    accuracy: jdouble,
) -> jstring {
    // SAFETY: see `session`.
    let Some(session) = (unsafe { session(handle) }) else {
        return std::ptr::null_mut();
    };
    let fix = Fix::from_reading(lat, lon, altitude(altitude_m), accuracy, Instant::now());
    session.process_fix(Some(&fix));
    snapshot(&mut env, session)
}

/// Maps to: NavBridge.processHeading(handle, degrees, accuracyGrade) -> Boolean
#[unsafe(no_mangle)]
pub extern "system" fn Java_com_trailmatch_app_NavBridge_processHeading(
    _env: JNIEnv,
    _class: JClass,
    handle: jlong,
    degrees: jdouble,
    accuracy: jint,
) -> jboolean {
    // SAFETY: see `session`.
    let Some(session) = (unsafe { session(handle) }) else {
        return JNI_FALSE;
    };
    let heading = Heading::new(degrees, CompassAccuracy::from_grade(accuracy));
    if session.process_heading(Some(heading)) { JNI_TRUE } else { JNI_FALSE }
}

/// Maps to: NavBridge.snooze(handle, multiplier) -> Long (ticket token)
///
/// The app schedules `wakeSnooze` itself after `multiplier` snooze periods.
#[unsafe(no_mangle)]
pub extern "system" fn Java_com_trailmatch_app_NavBridge_snooze(
    _env: JNIEnv,
    _class: JClass,
    handle: jlong,
    multiplier: jint,
) -> jlong {
    // SAFETY: see `session`.
    let Some(session) = (unsafe { session(handle) }) else {
        return 0;
    };
    let ticket = session.snooze(multiplier.max(1) as u32, Instant::now());
    ticket.token as jlong
}

/// Maps to: NavBridge.wakeSnooze(handle, token) -> Boolean
#[unsafe(no_mangle)]
pub extern "system" fn Java_com_trailmatch_app_NavBridge_wakeSnooze(
    _env: JNIEnv,
    _class: JClass,
    handle: jlong,
    token: jlong,
) -> jboolean {
    // SAFETY: see `session`.
    let Some(session) = (unsafe { session(handle) }) else {
        return JNI_FALSE;
    };
    let ticket = SnoozeTicket {
        token: token as u64,
        due: None,
    };
    if session.wake_snooze(&ticket) { JNI_TRUE } else { JNI_FALSE }
}

/// Maps to: NavBridge.reroute(handle, userId, lat, lon) -> Boolean
#[unsafe(no_mangle)]
pub extern "system" fn Java_com_trailmatch_app_NavBridge_reroute(
    mut env: JNIEnv,
    _class: JClass,
    handle: jlong,
    user_id: JString,
    lat: jdouble,
    lon: jdouble,
) -> jboolean {
    // SAFETY: see `session`.
    let Some(session) = (unsafe { session(handle) }) else {
        return JNI_FALSE;
    };
    let target = FollowTarget {
        target_user_id: read_string(&mut env, &user_id).unwrap_or_default(),
        target_point: GeoPoint::new(lat, lon),
    };
    match session.reroute(target) {
        Ok(()) => JNI_TRUE,
        Err(e) => {
            warn!("reroute rejected: {e}");
            JNI_FALSE
        }
    }
}

/// Maps to: NavBridge.followSos(handle, companionsJson) -> Boolean
///
/// Reroutes toward the member whose SOS is most recent.
#[unsafe(no_mangle)]
pub extern "system" fn Java_com_trailmatch_app_NavBridge_followSos(
    mut env: JNIEnv,
    _class: JClass,
    handle: jlong,
    companions_json: JString,
) -> jboolean {
    // SAFETY: see `session`.
    let Some(session) = (unsafe { session(handle) }) else {
        return JNI_FALSE;
    };
    let result = read_string(&mut env, &companions_json)
        .map(|json| companion::parse_list(&json))
        .unwrap_or_else(|| Ok(Vec::new()))
        .and_then(|companions| session.follow_sos(&companions));

    match result {
        Ok(()) => JNI_TRUE,
        Err(e) => {
            warn!("cannot follow SOS: {e}");
            JNI_FALSE
        }
    }
}

/// Maps to: NavBridge.resume(handle) -> Boolean
#[unsafe(no_mangle)]
pub extern "system" fn Java_com_trailmatch_app_NavBridge_resume(
    _env: JNIEnv,
    _class: JClass,
    handle: jlong,
) -> jboolean {
    // SAFETY: see `session`.
    let Some(session) = (unsafe { session(handle) }) else {
        return JNI_FALSE;
    };
    if session.resume() { JNI_TRUE } else { JNI_FALSE }
}

/// Maps to: NavBridge.radar(handle, companionsJson, radarConfigJson) -> String
#[unsafe(no_mangle)]
pub extern "system" fn Java_com_trailmatch_app_NavBridge_radar(
    mut env: JNIEnv,
    _class: JClass,
    handle: jlong,
    companions_json: JString,
    radar_config_json: JString,
) -> jstring {
    // SAFETY: see `session`.
    let Some(session) = (unsafe { session(handle) }) else {
        return std::ptr::null_mut();
    };
    let companions = read_string(&mut env, &companions_json)
        .map(|json| companion::parse_list(&json))
        .unwrap_or_else(|| Ok(Vec::new()));
    let config = match read_string(&mut env, &radar_config_json) {
        Some(json) if !json.trim().is_empty() => RadarConfig::from_json(&json),
        _ => Ok(RadarConfig::default()),
    };

    let (companions, config) = match (companions, config) {
        (Ok(companions), Ok(config)) => (companions, config),
        (Err(e), _) | (_, Err(e)) => {
            warn!("radar input rejected: {e}");
            return std::ptr::null_mut();
        }
    };

    let clusters = session.radar(&companions, &config);
    match serde_json::to_string(&clusters) {
        Ok(json) => to_jstring(&mut env, &json),
        Err(e) => {
            error!("failed to serialize radar frame: {e}");
            std::ptr::null_mut()
        }
    }
}

/// Maps to: NavBridge.pollTimers(handle) -> String (snapshot JSON)
///
/// Lets the app expire timed signals between fixes.
#[unsafe(no_mangle)]
pub extern "system" fn Java_com_trailmatch_app_NavBridge_pollTimers(
    mut env: JNIEnv,
    _class: JClass,
    handle: jlong,
) -> jstring {
    // SAFETY: see `session`.
    let Some(session) = (unsafe { session(handle) }) else {
        return std::ptr::null_mut();
    };
    session.poll_timers(Instant::now());
    snapshot(&mut env, session)
}

fn snapshot(env: &mut JNIEnv, session: &NavSession) -> jstring {
    match session.snapshot_json() {
        Ok(json) => to_jstring(env, &json),
        Err(e) => {
            error!("failed to serialize snapshot: {e}");
            std::ptr::null_mut()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const GPX: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<gpx version="1.1" creator="test"
     xmlns="http://www.topografix.com/GPX/1/1">
  <trk><trkseg>
    <trkpt lat="0.0" lon="0.0"></trkpt>
    <trkpt lat="0.0" lon="0.001"></trkpt>
    <trkpt lat="0.0" lon="0.002"></trkpt>
  </trkseg></trk>
</gpx>"#;

    #[test]
    fn build_session_with_default_config() {
        let session = build_session(GPX.as_bytes(), None).unwrap();
        assert_eq!(session.path().len(), 3);
        assert_eq!(session.config(), &NavConfig::default());
    }

    #[test]
    fn build_session_with_custom_config() {
        let session = build_session(GPX.as_bytes(), Some(r#"{"near_threshold_m": 30.0}"#)).unwrap();
        assert_eq!(session.config().near_threshold_m, 30.0);
    }

    #[test]
    fn build_session_rejects_bad_input() {
        assert!(build_session(b"<gpx", None).is_err());
        assert!(build_session(GPX.as_bytes(), Some("{")).is_err());
    }

    #[test]
    fn nan_altitude_means_none() {
        assert_eq!(altitude(f64::NAN), None);
        assert_eq!(altitude(412.5), Some(412.5));
    }

    #[test]
    fn null_handle_is_no_session() {
        assert!(unsafe { session(0) }.is_none());
    }
}
