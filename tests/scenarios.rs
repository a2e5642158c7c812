use approx::assert_relative_eq;
use gaze_vision::core_modules::chunk::{chunk_indices, merge_proximal_chunks};
use gaze_vision::core_modules::detector::{fuse_labels, BinocularPolicy, DetectionEngine, DetectorConfig};
use gaze_vision::core_modules::engbert_detector::EngbertConfig;
use gaze_vision::core_modules::event_builder::{aggregate_events, EventSamples};
use gaze_vision::core_modules::idt_detector::IdtConfig;
use gaze_vision::core_modules::ivt_detector::{IvtConfig, IvtDetector};
use gaze_vision::core_modules::nh_detector::NhConfig;
use gaze_vision::core_modules::screen_monitor::ViewingGeometry;
use gaze_vision::{
    DetectorKind, Eye, EyeSamples, GazeEvent, GazeEventType, GazePipeline, PipelineConfig, Trial,
};
use std::f64::consts::PI;

use gaze_vision::GazeEventType::*;

const N: usize = 50;

fn timestamps(n: usize) -> Vec<f64> {
    (0..n).map(|i| i as f64 * 2.0).collect()
}

fn ivt_engine() -> DetectionEngine {
    let detector = IvtDetector::new(IvtConfig::default()).unwrap();
    DetectionEngine::new(detector, DetectorConfig::default())
}

fn kinds(events: &[GazeEvent]) -> Vec<GazeEventType> {
    events.iter().map(GazeEvent::event_type).collect()
}

/// Fixational jitter around (500, 400), an 11-sample 300 px rightward saccade,
/// then jitter around (800, 400).
fn saccade_trial() -> Trial {
    let n = 211;
    let (x, y): (Vec<f64>, Vec<f64>) = (0..n)
        .map(|i| {
            let t = i as f64;
            let jitter = (0.3 * (1.7 * t).sin(), 0.3 * (2.3 * t).cos());
            match i {
                0..100 => (500.0 + jitter.0, 400.0 + jitter.1),
                100..111 => (500.0 + 150.0 * (1.0 - (PI * (t - 99.0) / 11.0).cos()), 400.0),
                _ => (800.0 + jitter.0, 400.0 + jitter.1),
            }
        })
        .unzip();
    Trial {
        id: 1,
        timestamps: timestamps(n),
        left: Some(EyeSamples::new(x, y, Some(vec![3.0; n]))),
        right: None,
    }
}

#[test]
fn still_gaze_is_a_single_fixation() {
    let ts = timestamps(N);
    let x = vec![100.0; N];
    let y = vec![100.0; N];
    let pupil = vec![4.0; N];

    let labels = ivt_engine().detect_monocular(&ts, &x, &y);
    assert_eq!(labels, vec![Fixation; N]);

    let samples = EventSamples {
        timestamps: &ts,
        x: &x,
        y: &y,
        pupil: Some(&pupil),
    };
    let events = aggregate_events(&samples, &labels, ViewingGeometry::default(), Some(Eye::Left)).unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].event_type(), Fixation);
    assert_relative_eq!(events[0].duration(), 98.0);
    assert_eq!(events[0].to_string(), "Fixation (98.0 ms)");
}

#[test]
fn missing_samples_form_a_blink_between_fixations() {
    let ts = timestamps(N);
    let mut x = vec![100.0; N];
    let mut y = vec![100.0; N];
    x[10..15].fill(f64::NAN);
    y[10..15].fill(f64::NAN);

    let labels = ivt_engine().detect_monocular(&ts, &x, &y);
    assert_eq!(&labels[..10], &[Fixation; 10]);
    assert_eq!(&labels[10..15], &[Blink; 5]);
    assert_eq!(&labels[15..], &[Fixation; 35]);

    let samples = EventSamples {
        timestamps: &ts,
        x: &x,
        y: &y,
        pupil: None,
    };
    let events = aggregate_events(&samples, &labels, ViewingGeometry::default(), None).unwrap();
    assert_eq!(kinds(&events), vec![Fixation, Blink, Fixation]);
    let spans: Vec<(f64, f64)> = events.iter().map(|e| (e.start_time(), e.end_time())).collect();
    assert_eq!(spans, vec![(0.0, 18.0), (20.0, 28.0), (30.0, 98.0)]);
}

#[test]
fn both_policy_keeps_only_agreement() {
    let left = vec![Fixation; 10];
    let right = [vec![Fixation; 5], vec![Saccade; 5]].concat();
    let fused = fuse_labels(&left, &right, BinocularPolicy::Both).unwrap();
    assert_eq!(fused, [vec![Fixation; 5], vec![Undefined; 5]].concat());
    assert!("sideways".parse::<BinocularPolicy>().is_err());
}

#[test]
fn short_chunk_between_fixations_is_merged() {
    let labels = [vec![Fixation; 20], vec![Saccade; 3], vec![Fixation; 20]].concat();
    let merged = merge_proximal_chunks(&labels, 5, &[Blink]);
    assert_eq!(chunk_indices(&merged), vec![0..43]);
    assert_eq!(merged, vec![Fixation; 43]);
}

#[test]
fn every_algorithm_finds_the_saccade() {
    let trial = saccade_trial();
    let detectors = [
        DetectorKind::Ivt(IvtConfig::default()),
        DetectorKind::Idt(IdtConfig::default()),
        DetectorKind::Engbert(EngbertConfig::default()),
        DetectorKind::Nh(NhConfig::default()),
    ];
    for detector in detectors {
        let name = format!("{detector:?}");
        let pipeline = GazePipeline::new(PipelineConfig {
            detector,
            ..PipelineConfig::default()
        })
        .unwrap();
        let report = pipeline.process_trial(&trial).unwrap();
        assert_eq!(report.labels[105], Saccade, "{name}");
        assert_eq!(report.labels[50], Fixation, "{name}");
        assert_eq!(report.labels[180], Fixation, "{name}");

        let events = report.events_for(Eye::Left).unwrap();
        let saccades: Vec<&GazeEvent> = events.iter().filter(|e| e.event_type() == Saccade).collect();
        assert_eq!(saccades.len(), 1, "{name}");
        let saccade = saccades[0];
        assert!(saccade.start_time() <= 210.0 && saccade.end_time() >= 210.0, "{name}");
        let summary = saccade.summary();
        assert!(summary.amplitude.unwrap() > 0.0, "{name}");
        // rightward on screen
        let azimuth = summary.azimuth.unwrap();
        assert!(azimuth < 10.0 || azimuth > 350.0, "{name}: azimuth {azimuth}");

        assert!(events.iter().filter(|e| e.event_type() == Fixation).count() >= 2, "{name}");
        assert!(events.windows(2).all(|w| w[0].start_time() <= w[1].start_time()));
    }
}

#[test]
fn either_policy_fills_one_eyes_blink_from_the_other() {
    let ts = timestamps(N);
    let open = EyeSamples::new(vec![300.0; N], vec![300.0; N], None);
    let mut blinking = open.clone();
    blinking.x[20..30].fill(f64::NAN);
    blinking.y[20..30].fill(f64::NAN);

    let config = PipelineConfig::from_json_str(r#"{ "policy": "either" }"#).unwrap();
    let pipeline = GazePipeline::new(config).unwrap();
    let report = pipeline
        .process_trial(&Trial {
            id: 3,
            timestamps: ts,
            left: Some(open),
            right: Some(blinking),
        })
        .unwrap();

    assert_eq!(report.labels, vec![Fixation; N]);
    assert_eq!(report.events.len(), 2);
    // the right eye's events are cut from the fused labels, so its NaN samples sit inside the fixation
    let right = report.events_for(Eye::Right).unwrap();
    assert_eq!(kinds(right), vec![Fixation]);
}
