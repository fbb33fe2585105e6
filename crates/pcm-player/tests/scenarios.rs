use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use pcm_player::{
    EngineConfig, ErrorKind, ManualBackend, PlayState, Player, PlayerRegistry, SampleEncoding,
    SampleFormat,
};

fn registry() -> (PlayerRegistry, ManualBackend) {
    let backend = ManualBackend::new();
    let reg = PlayerRegistry::new(Arc::new(backend.clone()), EngineConfig::default());
    (reg, backend)
}

fn i16_bytes(samples: &[i16]) -> Vec<u8> {
    samples.iter().flat_map(|s| s.to_le_bytes()).collect()
}

#[test]
fn one_frame_plays_then_silence() {
    let (reg, backend) = registry();
    let h = reg.initialize(44_100, 2, SampleEncoding::Int16).unwrap();

    assert_eq!(
        reg.feed(h, i16_bytes(&[8192, -8192])).wait().unwrap(),
        PlayState::Stopped
    );
    assert_eq!(reg.play(h).wait().unwrap(), PlayState::Playing);

    let probe = backend.last_probe().unwrap();
    assert_eq!(probe.render(2), vec![0.25, -0.25, 0.0, 0.0]);
    assert_eq!(probe.render(3), vec![0.0; 6]);

    let status = reg.status(h).wait().unwrap();
    assert_eq!(status.state, PlayState::Playing);
    assert_eq!(status.played_frames, 1);
    assert_eq!(status.queued_frames, 0);
    reg.release(h).unwrap();
}

#[test]
fn play_after_release_is_invalid_state() {
    let backend = ManualBackend::new();
    let format = SampleFormat::new(48_000, 1, SampleEncoding::Float32).unwrap();
    let mut player = Player::initialize(&backend, format, &EngineConfig::default()).unwrap();
    player.release().unwrap();

    let err = player.play().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidState);
    assert_eq!(err.code(), "Error");
    assert_eq!(player.state(), PlayState::Released);
}

#[test]
fn play_on_released_handle_is_invalid_state() {
    let (reg, backend) = registry();
    let h = reg.initialize(44_100, 2, SampleEncoding::Int16).unwrap();
    reg.release(h).unwrap();

    assert_eq!(reg.play(h).wait().unwrap_err().kind(), ErrorKind::InvalidState);
    assert_eq!(reg.release(h).unwrap_err().kind(), ErrorKind::InvalidState);
    assert_eq!(backend.open_streams(), 0);
}

#[test]
fn zero_volume_renders_silence() {
    let (reg, backend) = registry();
    let h = reg.initialize(22_050, 1, SampleEncoding::Int8).unwrap();
    reg.set_volume(h, 0.0).wait().unwrap();
    reg.feed(h, vec![100, 50, 127, 1]).wait().unwrap();
    reg.play(h).wait().unwrap();

    let out = backend.last_probe().unwrap().render(4);
    assert!(out.iter().all(|s| *s == 0.0), "{out:?}");
    assert_eq!(reg.status(h).wait().unwrap().played_frames, 4);
}

#[test]
fn chunks_play_in_feed_order() {
    let (reg, backend) = registry();
    let h = reg.initialize(8_000, 1, SampleEncoding::Int16).unwrap();
    for chunk in [&[1000i16, 2000][..], &[3000], &[4000, 5000, 6000]] {
        reg.feed(h, i16_bytes(chunk)).wait().unwrap();
    }
    reg.play(h).wait().unwrap();

    let probe = backend.last_probe().unwrap();
    let mut heard = probe.render(4);
    heard.extend(probe.render(4));
    let expected: Vec<f32> = [1000, 2000, 3000, 4000, 5000, 6000, 0, 0]
        .iter()
        .map(|s| *s as f32 / 32768.0)
        .collect();
    assert_eq!(heard, expected);
}

#[test]
fn misaligned_feed_is_rejected() {
    let (reg, _backend) = registry();
    let h = reg.initialize(44_100, 2, SampleEncoding::Int16).unwrap();
    let err = reg.feed(h, vec![0; 3]).wait().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidFormat);
    assert_eq!(reg.status(h).wait().unwrap().queued_frames, 0);
}

#[test]
fn pause_resume_preserves_position() {
    let (reg, backend) = registry();
    let h = reg.initialize(8_000, 1, SampleEncoding::Int16).unwrap();
    reg.feed(h, i16_bytes(&[1, 2, 3, 4])).wait().unwrap();
    reg.play(h).wait().unwrap();
    let probe = backend.last_probe().unwrap();
    probe.render(2);

    assert_eq!(reg.pause(h).wait().unwrap(), PlayState::Paused);
    assert_eq!(probe.render(2), vec![0.0, 0.0]);
    assert_eq!(reg.status(h).wait().unwrap().queued_frames, 2);

    assert_eq!(reg.resume(h).wait().unwrap(), PlayState::Playing);
    assert_eq!(probe.render(2), vec![3.0 / 32768.0, 4.0 / 32768.0]);
}

#[test]
fn release_stops_callbacks_from_reading_the_queue() {
    let backend = ManualBackend::new();
    let format = SampleFormat::new(8_000, 1, SampleEncoding::Int16).unwrap();
    let mut player = Player::initialize(&backend, format, &EngineConfig::default()).unwrap();
    for _ in 0..64 {
        player.feed(i16_bytes(&[4096; 64])).unwrap();
    }
    player.play().unwrap();

    let probe = backend.last_probe().unwrap();
    let running = Arc::new(AtomicBool::new(true));
    let callbacks = {
        let running = running.clone();
        thread::spawn(move || {
            while running.load(Ordering::Relaxed) {
                probe.render_unchecked(16);
            }
        })
    };

    thread::sleep(Duration::from_millis(5));
    player.stop().unwrap();
    assert_eq!(player.release().unwrap(), PlayState::Released);
    let played_at_release = player.status().played_frames;

    thread::sleep(Duration::from_millis(20));
    running.store(false, Ordering::Relaxed);
    callbacks.join().unwrap();

    assert_eq!(player.status().played_frames, played_at_release);
    assert_eq!(player.queued_frames(), 0);
    assert_eq!(backend.open_streams(), 0);
}

#[test]
fn concurrent_callers_share_one_player() {
    let (reg, backend) = registry();
    let reg = Arc::new(reg);
    let h = reg.initialize(8_000, 1, SampleEncoding::Int8).unwrap();
    reg.play(h).wait().unwrap();

    let feeders: Vec<_> = (0..4)
        .map(|_| {
            let reg = reg.clone();
            thread::spawn(move || {
                for _ in 0..25 {
                    reg.feed(h, vec![1; 10]).wait().unwrap();
                }
            })
        })
        .collect();
    for f in feeders {
        f.join().unwrap();
    }

    assert_eq!(reg.status(h).wait().unwrap().queued_frames, 1000);
    let out = backend.last_probe().unwrap().render(1000);
    assert!(out.iter().all(|s| *s == 1.0 / 128.0));
    reg.release(h).unwrap();
}
