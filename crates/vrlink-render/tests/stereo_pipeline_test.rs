use std::io::Cursor;
use std::sync::Arc;

use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use vrlink_core::{ContextStage, Eye, FilterMode, RawImage, StereoError, StereoMailbox, ViewerConfig};
use vrlink_render::backend::software::{BackendEvent, FaultPlan};
use vrlink_render::{
    DisplaySession, FrameDecoder, FrameIngest, GraphicsBackend, SessionState, SoftwareBackend,
    SoftwareSurface,
};

const EYE: u32 = 16;

fn viewer_config() -> ViewerConfig {
    let mut config = ViewerConfig::default();
    config.textures.width = EYE;
    config.textures.height = EYE;
    config.display.filter = FilterMode::Nearest;
    config
}

fn png(width: u32, height: u32, rgb: [u8; 3]) -> Vec<u8> {
    let mut out = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, Rgb(rgb)))
        .write_to(&mut out, ImageFormat::Png)
        .unwrap();
    out.into_inner()
}

fn jpeg(width: u32, height: u32, rgb: [u8; 3]) -> Vec<u8> {
    let mut out = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, Rgb(rgb)))
        .write_to(&mut out, ImageFormat::Jpeg)
        .unwrap();
    out.into_inner()
}

struct Rig {
    mailbox: Arc<StereoMailbox>,
    ingest: FrameIngest,
    session: DisplaySession<SoftwareBackend>,
}

fn rig(backend: SoftwareBackend) -> Rig {
    let config = viewer_config();
    let mailbox = Arc::new(StereoMailbox::new());
    Rig {
        ingest: FrameIngest::inline(&config, mailbox.clone()).unwrap(),
        session: DisplaySession::new(backend, &config, mailbox.clone()),
        mailbox,
    }
}

const SURFACE: SoftwareSurface = SoftwareSurface {
    width: 2 * EYE,
    height: EYE,
};

fn assert_halves(session: &DisplaySession<SoftwareBackend>, left: [u8; 3], right: [u8; 3]) {
    let out = session.backend().presented().expect("a presented frame");
    for y in 0..EYE {
        for x in 0..2 * EYE {
            let px = out.get_pixel(x, y).0;
            let expected = if x < EYE { left } else { right };
            assert_eq!([px[0], px[1], px[2]], expected, "pixel ({x},{y})");
        }
    }
}

#[test]
fn test_red_left_blue_right_is_pixel_exact() {
    let mut rig = rig(SoftwareBackend::new());
    rig.session.attach_surface(SURFACE).unwrap();
    rig.session.configure(2 * EYE, EYE).unwrap();

    let red = png(EYE, EYE, [255, 0, 0]);
    let blue = png(EYE, EYE, [0, 0, 255]);
    rig.ingest.on_frame_received(Eye::Left, &red, red.len()).unwrap();
    rig.ingest.on_frame_received(Eye::Right, &blue, blue.len()).unwrap();
    rig.session.render_frame().unwrap();

    assert_halves(&rig.session, [255, 0, 0], [0, 0, 255]);
    assert_eq!(rig.session.stats().uploads, 2);
}

#[test]
fn test_jpeg_frames_reach_the_right_eyes() {
    let mut rig = rig(SoftwareBackend::new());
    rig.session.attach_surface(SURFACE).unwrap();

    let left = jpeg(EYE, EYE, [250, 10, 10]);
    let right = jpeg(EYE, EYE, [10, 10, 250]);
    rig.ingest.on_frame_received(Eye::Left, &left, left.len()).unwrap();
    rig.ingest.on_frame_received(Eye::Right, &right, right.len()).unwrap();
    rig.session.render_frame().unwrap();

    let out = rig.session.backend().presented().unwrap();
    let l = out.get_pixel(EYE / 2, EYE / 2).0;
    let r = out.get_pixel(EYE + EYE / 2, EYE / 2).0;
    assert!(l[0] > 200 && l[2] < 50, "left eye {l:?}");
    assert!(r[2] > 200 && r[0] < 50, "right eye {r:?}");
}

#[test]
fn test_side_by_side_frame_splits_across_eyes() {
    let mut rig = rig(SoftwareBackend::new());
    rig.session.attach_surface(SURFACE).unwrap();

    let mut both = RgbImage::new(2 * EYE, EYE);
    for (x, _, px) in both.enumerate_pixels_mut() {
        *px = if x < EYE { Rgb([0, 255, 0]) } else { Rgb([255, 255, 0]) };
    }
    let mut bytes = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(both)
        .write_to(&mut bytes, ImageFormat::Png)
        .unwrap();
    let bytes = bytes.into_inner();
    rig.ingest.on_stereo_frame_received(&bytes, bytes.len()).unwrap();
    rig.session.render_frame().unwrap();

    assert_halves(&rig.session, [0, 255, 0], [255, 255, 0]);
}

#[test]
fn test_latest_frame_wins() {
    let mut rig = rig(SoftwareBackend::new());
    rig.session.attach_surface(SURFACE).unwrap();

    for rgb in [[255, 0, 0], [0, 255, 0], [0, 0, 255]] {
        let bytes = png(EYE, EYE, rgb);
        rig.ingest.on_frame_received(Eye::Left, &bytes, bytes.len()).unwrap();
        rig.ingest.on_frame_received(Eye::Right, &bytes, bytes.len()).unwrap();
    }
    rig.session.render_frame().unwrap();

    assert_halves(&rig.session, [0, 0, 255], [0, 0, 255]);
    assert_eq!(rig.mailbox.superseded(), 4);
    assert_eq!(rig.ingest.stats().frames_superseded, 4);
    assert_eq!(rig.session.stats().uploads, 2);
}

#[test]
fn test_no_new_frame_repeats_previous_textures() {
    let mut rig = rig(SoftwareBackend::new());
    rig.session.attach_surface(SURFACE).unwrap();

    let red = png(EYE, EYE, [255, 0, 0]);
    rig.ingest.on_frame_received(Eye::Left, &red, red.len()).unwrap();
    rig.ingest.on_frame_received(Eye::Right, &red, red.len()).unwrap();
    rig.session.render_frame().unwrap();
    rig.session.render_frame().unwrap();

    assert_halves(&rig.session, [255, 0, 0], [255, 0, 0]);
    assert_eq!(rig.session.stats().frames_presented, 2);
}

#[test]
fn test_corrupt_frame_keeps_last_good_texture() {
    let mut rig = rig(SoftwareBackend::new());
    rig.session.attach_surface(SURFACE).unwrap();

    let red = png(EYE, EYE, [255, 0, 0]);
    rig.ingest.on_frame_received(Eye::Left, &red, red.len()).unwrap();
    rig.session.render_frame().unwrap();

    let good = jpeg(EYE, EYE, [0, 0, 255]);
    let truncated = &good[..good.len() / 2];
    assert!(rig
        .ingest
        .on_frame_received(Eye::Left, truncated, truncated.len())
        .is_err());
    assert!(rig.ingest.on_frame_received(Eye::Left, &[], 0).is_err());
    rig.session.render_frame().unwrap();

    let out = rig.session.backend().presented().unwrap();
    assert_eq!(out.get_pixel(1, 1).0, [255, 0, 0, 255]);
    // Right eye never received a frame and still shows the placeholder.
    assert_eq!(out.get_pixel(EYE + 1, 1).0, [128, 128, 128, 255]);
    assert_eq!(rig.ingest.stats().decode_failures, 2);
}

#[test]
fn test_decoded_size_is_width_height_three() {
    let pool = Arc::new(vrlink_core::BufferPool::new());
    let mut decoder = FrameDecoder::from_config(&viewer_config(), pool).unwrap();
    let image: RawImage = decoder.decode(&jpeg(40, 20, [1, 2, 3])).unwrap();
    assert_eq!(image.dimensions(), (EYE, EYE));
    assert_eq!(image.as_bytes().len(), (EYE * EYE * 3) as usize);
}

#[test]
fn test_render_before_attach_fails() {
    let mut rig = rig(SoftwareBackend::new());
    assert!(matches!(
        rig.session.render_frame(),
        Err(StereoError::IllegalState(_))
    ));
    assert_eq!(rig.session.backend().present_count(), 0);
}

#[test]
fn test_every_stage_failure_leaves_session_uninitialized() {
    for stage in [
        ContextStage::Display,
        ContextStage::ChooseConfig,
        ContextStage::CreateSurface,
        ContextStage::CreateContext,
        ContextStage::MakeCurrent,
        ContextStage::SwapInterval,
    ] {
        let mut rig = rig(SoftwareBackend::with_faults(FaultPlan {
            fail_stage: Some(stage),
            ..FaultPlan::default()
        }));
        match rig.session.attach_surface(SURFACE) {
            Err(StereoError::Context { stage: failed, .. }) => assert_eq!(failed, stage),
            other => panic!("expected {stage} failure, got {other:?}"),
        }
        assert_eq!(rig.session.state(), SessionState::Uninitialized);
        assert!(!rig.session.backend().is_connected());
    }
}

#[test]
fn test_transient_present_failure_recovers() {
    let mut rig = rig(SoftwareBackend::with_faults(FaultPlan {
        fail_presents: 1,
        ..FaultPlan::default()
    }));
    rig.session.attach_surface(SURFACE).unwrap();

    let err = rig.session.render_frame().unwrap_err();
    assert!(err.is_transient());
    assert_eq!(rig.session.state(), SessionState::Rendering);

    rig.session.render_frame().unwrap();
    let stats = rig.session.stats();
    assert_eq!(stats.present_failures, 1);
    assert_eq!(stats.frames_presented, 1);
}

#[test]
fn test_detach_releases_dependents_before_owners() {
    let mut rig = rig(SoftwareBackend::new());
    rig.session.attach_surface(SURFACE).unwrap();
    rig.session.render_frame().unwrap();
    rig.session.detach_surface().unwrap();
    rig.session.detach_surface().unwrap();

    let teardown: Vec<BackendEvent> = rig
        .session
        .backend()
        .events()
        .iter()
        .copied()
        .filter(|e| {
            !matches!(
                e,
                BackendEvent::TextureCreated(_) | BackendEvent::PipelineCreated(_)
            )
        })
        .collect();
    assert!(matches!(
        teardown.as_slice(),
        [
            BackendEvent::TextureDestroyed(_),
            BackendEvent::TextureDestroyed(_),
            BackendEvent::PipelineDestroyed(_),
            BackendEvent::ContextReleased,
            BackendEvent::SurfaceReleased,
            BackendEvent::DisplayReleased,
        ]
    ));
    assert_eq!(rig.session.state(), SessionState::TornDown);
}

#[test]
fn test_calls_from_another_thread_are_rejected() {
    let mut rig = rig(SoftwareBackend::new());
    rig.session.attach_surface(SURFACE).unwrap();

    let session = &mut rig.session;
    let results = std::thread::scope(|scope| {
        scope
            .spawn(|| {
                (
                    session.render_frame(),
                    session.configure(8, 8),
                    session.detach_surface(),
                )
            })
            .join()
            .unwrap()
    });
    assert!(matches!(results.0, Err(StereoError::IllegalState(_))));
    assert!(matches!(results.1, Err(StereoError::IllegalState(_))));
    assert!(matches!(results.2, Err(StereoError::IllegalState(_))));

    assert_eq!(rig.session.state(), SessionState::Rendering);
    rig.session.render_frame().unwrap();
}
