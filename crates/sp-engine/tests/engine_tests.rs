//! Engine integration tests
//!
//! End-to-end scenarios through the session graph at 48 kHz stereo:
//! - Pan law and constant-power centre
//! - Solo precedence across tracks
//! - Loop wrap-around during playback
//! - Clip fades through the direct read path
//! - Master mute
//! - The hardware-callback composition (render, then advance)
//! - Observer notifications across the graph

use std::sync::Arc;

use sp_core::{ClipChange, EngineEvent, TrackChange, TransportEvent, TransportStateTag};
use sp_engine::{AudioClip, Session, SessionConfig};

// ═══════════════════════════════════════════════════════════════════════════
// HELPERS
// ═══════════════════════════════════════════════════════════════════════════

const SAMPLE_RATE: u32 = 48_000;
const SQRT_HALF: f32 = std::f32::consts::FRAC_1_SQRT_2;

fn session() -> Session {
    Session::new(SessionConfig {
        sample_rate: SAMPLE_RATE,
        channel_count: 2,
        max_block_frames: 4096,
        event_capacity: 4096,
    })
    .unwrap()
}

/// Stereo clip holding `value` in both channels for `frames` frames
fn constant_clip(value: f32, frames: usize) -> AudioClip {
    AudioClip::from_samples("tone", 2, SAMPLE_RATE, vec![value; frames * 2]).unwrap()
}

// ═══════════════════════════════════════════════════════════════════════════
// MIX SCENARIOS
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn centre_panned_unity_tone_hits_minus_3_db() {
    let session = session();
    let track_id = session.add_audio_track("tone");
    let track = session.mixer().track(track_id).unwrap();
    track.add_clip(constant_clip(1.0, 48));

    session.transport().play();

    let mut out = vec![0.0f32; 96];
    session.mixer().process_buffer(&mut out, 48);

    for &sample in &out {
        assert!(
            (sample - SQRT_HALF).abs() < 1e-6,
            "expected √2/2 at every sample, got {sample}"
        );
    }
}

#[test]
fn hard_left_pan_keeps_right_silent() {
    let session = session();
    let track_id = session.add_audio_track("tone");
    let track = session.mixer().track(track_id).unwrap();
    track.add_clip(constant_clip(1.0, 48));
    track.set_pan(-1.0).unwrap();

    session.transport().play();

    let mut out = vec![0.0f32; 96];
    session.mixer().process_buffer(&mut out, 48);

    for frame in out.chunks(2) {
        assert!((frame[0] - 1.0).abs() < 1e-6, "left should be unity");
        assert!(frame[1].abs() < 1e-6, "right should be silent");
    }
}

#[test]
fn solo_silences_everything_else() {
    let session = session();

    let a = session.mixer().track(session.add_audio_track("a")).unwrap();
    a.add_clip(constant_clip(0.5, 48));

    let b = session.mixer().track(session.add_audio_track("b")).unwrap();
    b.add_clip(constant_clip(0.3, 48));
    b.set_solo(true);

    session.transport().play();

    let mut out = vec![0.0f32; 96];
    session.mixer().process_buffer(&mut out, 48);

    let expected = 0.3 * SQRT_HALF;
    for &sample in &out {
        assert!(
            (sample - expected).abs() < 1e-6,
            "output should be the soloed track alone, got {sample}"
        );
    }
}

#[test]
fn two_solo_tracks_both_sound() {
    let session = session();

    let a = session.mixer().track(session.add_audio_track("a")).unwrap();
    a.add_clip(constant_clip(0.2, 48));
    a.set_solo(true);

    let b = session.mixer().track(session.add_audio_track("b")).unwrap();
    b.add_clip(constant_clip(0.3, 48));
    b.set_solo(true);

    let c = session.mixer().track(session.add_audio_track("c")).unwrap();
    c.add_clip(constant_clip(0.4, 48));

    session.transport().play();

    let mut out = vec![0.0f32; 96];
    session.mixer().process_buffer(&mut out, 48);

    let expected = (0.2 + 0.3) * SQRT_HALF;
    for &sample in &out {
        assert!(
            (sample - expected).abs() < 1e-6,
            "the non-solo track must contribute zero energy, got {sample}"
        );
    }
}

#[test]
fn muted_master_is_all_zeros() {
    let session = session();
    let track = session.mixer().track(session.add_audio_track("t")).unwrap();
    track.add_clip(constant_clip(0.8, 480));
    track.set_pan(0.4).unwrap();

    session.transport().play();
    session.mixer().set_master_muted(true);

    let mut out = vec![9.0f32; 960];
    session.mixer().process_buffer(&mut out, 480);
    assert!(out.iter().all(|&s| s == 0.0));
}

// ═══════════════════════════════════════════════════════════════════════════
// TRANSPORT SCENARIOS
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn loop_wraps_during_advance() {
    let session = session();
    let transport = session.transport();

    transport.set_loop_start(0);
    transport.set_loop_end(1000);
    transport.set_looping(true);
    transport.play();
    transport.seek(900);

    transport.advance(200);
    assert_eq!(transport.position(), 100);
}

#[test]
fn callback_contract_renders_then_advances() {
    let session = session();
    let track = session.mixer().track(session.add_audio_track("t")).unwrap();

    // One second of 1.0 followed by storage end
    track.add_clip(constant_clip(1.0, SAMPLE_RATE as usize));
    session.transport().play();

    let mut out = vec![0.0f32; 1024];
    for _ in 0..4 {
        session.process_callback(&mut out, 512);
    }
    assert_eq!(session.transport().position(), 2048);

    // The block rendered before each advance: still inside the clip
    assert!(out.iter().all(|&s| (s - SQRT_HALF).abs() < 1e-6));
}

#[test]
fn playback_past_clip_end_goes_silent() {
    let session = session();
    let track = session.mixer().track(session.add_audio_track("t")).unwrap();
    track.add_clip(constant_clip(1.0, 100));

    session.transport().play();
    session.transport().seek(96);

    let mut out = vec![0.0f32; 32];
    session.mixer().process_buffer(&mut out, 16);

    // Frames 96..100 sound, frames 100..112 are silence
    for frame in 0..16 {
        let expected = if frame < 4 { SQRT_HALF } else { 0.0 };
        assert!(
            (out[frame * 2] - expected).abs() < 1e-6,
            "frame {frame} expected {expected}, got {}",
            out[frame * 2]
        );
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// CLIP ENVELOPE SCENARIOS
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn fade_in_midpoint_on_direct_read() {
    let clip = AudioClip::from_samples("tone", 1, SAMPLE_RATE, vec![1.0; 1000]).unwrap();
    clip.set_fade_in_length(100);
    clip.set_gain(1.0).unwrap();

    let mut dst = vec![0.0f32; 1];
    clip.read_samples(&mut dst, 0, 1, 50).unwrap();
    assert!(
        (0.45..=0.55).contains(&dst[0]),
        "fade midpoint should sit near 0.5, got {}",
        dst[0]
    );
}

#[test]
fn clip_gain_scales_through_the_mix() {
    let session = session();
    let track = session.mixer().track(session.add_audio_track("t")).unwrap();

    let clip = constant_clip(0.5, 48);
    clip.set_gain(2.0).unwrap();
    track.add_clip(clip);

    session.transport().play();

    let mut out = vec![0.0f32; 96];
    session.mixer().process_buffer(&mut out, 48);
    for &sample in &out {
        assert!((sample - SQRT_HALF).abs() < 1e-6);
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// OBSERVER FLOW
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn notifications_flow_across_the_graph() {
    let mut session = session();
    let events = session.take_events().unwrap();

    session.clock().set_tempo(140.0).unwrap();
    let track_id = session.add_audio_track("t");
    let track = session.mixer().track(track_id).unwrap();
    track.set_volume(0.5).unwrap();

    let clip_id = track.add_clip(constant_clip(0.1, 16));
    track.clip(clip_id).unwrap().as_audio().unwrap().set_start_position(32);

    session.transport().play();
    session.transport().stop();

    let seen = events.drain();

    assert!(seen.iter().any(|e| matches!(
        e,
        EngineEvent::Clock(sp_core::ClockEvent::TempoChanged(t)) if *t == 140.0
    )));
    assert!(seen.iter().any(|e| matches!(
        e,
        EngineEvent::Track { change: TrackChange::Volume(_), .. }
    )));
    assert!(seen.iter().any(|e| matches!(
        e,
        EngineEvent::Track { change: TrackChange::ClipAdded(_), .. }
    )));
    // Moving a clip reports both edges
    assert!(seen.iter().any(|e| matches!(
        e,
        EngineEvent::Clip { change: ClipChange::StartPosition(32), .. }
    )));
    assert!(seen.iter().any(|e| matches!(
        e,
        EngineEvent::Clip { change: ClipChange::EndPosition(48), .. }
    )));
    assert!(seen.iter().any(|e| matches!(
        e,
        EngineEvent::Transport(TransportEvent::StateChanged(TransportStateTag::Playing))
    )));
    assert!(seen.iter().any(|e| matches!(
        e,
        EngineEvent::Transport(TransportEvent::StateChanged(TransportStateTag::Stopped))
    )));
}

// ═══════════════════════════════════════════════════════════════════════════
// EDIT-WHILE-CONFIGURED SCENARIOS
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn split_preserves_playback() {
    let session = session();
    let track = session.mixer().track(session.add_audio_track("t")).unwrap();

    let material: Vec<f32> = (0..200).map(|i| (i / 2) as f32).collect();
    let clip_id = track.add_clip(
        AudioClip::from_samples("ramp", 2, SAMPLE_RATE, material).unwrap(),
    );
    track.split_clip(clip_id, 60).unwrap();

    session.transport().play();
    session.transport().seek(58);

    // Render across the split seam; the material must be continuous
    let mut out = vec![0.0f32; 8];
    session.mixer().process_buffer(&mut out, 4);
    let expected = [58.0, 58.0, 59.0, 59.0, 60.0, 60.0, 61.0, 61.0];
    for (i, (&got, &want)) in out.iter().zip(expected.iter()).enumerate() {
        assert!(
            (got - want * SQRT_HALF).abs() < 1e-3,
            "sample {i}: got {got}, want {}",
            want * SQRT_HALF
        );
    }
}

#[test]
fn removed_track_vanishes_from_next_buffer() {
    let session = session();
    let keep = session.mixer().track(session.add_audio_track("keep")).unwrap();
    keep.add_clip(constant_clip(0.25, 48));
    let drop_id = session.add_audio_track("drop");
    session
        .mixer()
        .track(drop_id)
        .unwrap()
        .add_clip(constant_clip(0.5, 48));

    session.transport().play();

    let mut out = vec![0.0f32; 96];
    session.mixer().process_buffer(&mut out, 48);
    assert!((out[0] - 0.75 * SQRT_HALF).abs() < 1e-6);

    assert!(session.mixer().remove_track(drop_id));
    session.mixer().process_buffer(&mut out, 48);
    assert!(
        (out[0] - 0.25 * SQRT_HALF).abs() < 1e-6,
        "removed track still audible: {}",
        out[0]
    );
}
