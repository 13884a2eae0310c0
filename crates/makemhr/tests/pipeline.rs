//! Whole runs of the pipeline, from definition (or SOFA) file to `.mhr` on disk.
use std::io::Read;
use std::path::{Path, PathBuf};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use pretty_assertions::assert_eq;

use makemhr::config::{ChannelMode, HeadModel, ProcessingOptions};
use makemhr::error::SofaError;
use makemhr::pipeline::process_definition;
use makemhr::sofa::{spherical_to_cartesian, SofaDelays, SofaMeasurements, SofaReader, UnsupportedSofaReader};

/// A fresh directory for one test.
fn temp_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("makemhr-e2e-{}-{}", name, std::process::id()));
    let _ = std::fs::remove_dir_all(&dir);
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

fn options(dir: &Path) -> ProcessingOptions {
    ProcessingOptions {
        fft_size: 256,
        trunc_size: 32,
        output: dir.join("out_%r.mhr").to_string_lossy().into_owned(),
        ..Default::default()
    }
}

/// A short decaying response starting at `onset`.
fn response(points: usize, onset: usize, gain: f64) -> Vec<f64> {
    let mut out = vec![0.0; points];
    for (i, s) in out[onset..].iter_mut().enumerate().take(12) {
        *s = gain * 0.8 * (-0.5 * i as f64).exp() * if i % 2 == 0 { 1.0 } else { -0.6 };
    }
    out
}

fn slash(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

fn write_ascii(path: &Path, samples: &[f64]) -> String {
    let text = samples.iter().map(|s| format!("{s:.9}")).collect::<Vec<_>>().join("\n");
    std::fs::write(path, text).unwrap();
    slash(path)
}

fn write_bin_le(path: &Path, samples: &[f64]) -> String {
    let mut bytes = vec![];
    for s in samples {
        bytes.write_f64::<LittleEndian>(*s).unwrap();
    }
    std::fs::write(path, bytes).unwrap();
    slash(path)
}

fn write_wave(path: &Path, rate: u32, samples: &[f64]) -> String {
    let data = samples
        .iter()
        .map(|s| (s * 32767.0).round() as i16)
        .collect::<Vec<_>>();
    let mut bytes = vec![];
    bytes.extend_from_slice(b"RIFF");
    bytes.write_u32::<LittleEndian>(4 + 24 + 8 + data.len() as u32 * 2).unwrap();
    bytes.extend_from_slice(b"WAVE");
    bytes.extend_from_slice(b"fmt ");
    bytes.write_u32::<LittleEndian>(16).unwrap();
    bytes.write_u16::<LittleEndian>(1).unwrap();
    bytes.write_u16::<LittleEndian>(1).unwrap();
    bytes.write_u32::<LittleEndian>(rate).unwrap();
    bytes.write_u32::<LittleEndian>(rate * 2).unwrap();
    bytes.write_u16::<LittleEndian>(2).unwrap();
    bytes.write_u16::<LittleEndian>(16).unwrap();
    bytes.extend_from_slice(b"data");
    bytes.write_u32::<LittleEndian>(data.len() as u32 * 2).unwrap();
    for s in data {
        bytes.write_i16::<LittleEndian>(s).unwrap();
    }
    std::fs::write(path, bytes).unwrap();
    slash(path)
}

/// The parts of an `.mhr` file the tests look at.
#[derive(Debug)]
struct Mhr {
    rate: u32,
    channels: usize,
    ir_points: usize,
    /// Distance in millimeters and azimuth counts, farthest field first.
    fields: Vec<(u16, Vec<u8>)>,
    samples: Vec<i32>,
    delays: Vec<u8>,
}

fn read_mhr(path: &Path) -> Mhr {
    let bytes = std::fs::read(path).unwrap();
    let mut r = &bytes[..];
    let mut magic = [0u8; 8];
    r.read_exact(&mut magic).unwrap();
    assert_eq!(&magic, b"MinPHR03");

    let rate = r.read_u32::<LittleEndian>().unwrap();
    let channels = r.read_u8().unwrap() as usize + 1;
    let ir_points = r.read_u32::<LittleEndian>().unwrap() as usize;
    let field_count = r.read_u32::<LittleEndian>().unwrap();
    let mut fields = vec![];
    for _ in 0..field_count {
        let distance = r.read_u16::<LittleEndian>().unwrap();
        let ev_count = r.read_u8().unwrap();
        let counts = (0..ev_count).map(|_| r.read_u8().unwrap()).collect::<Vec<_>>();
        fields.push((distance, counts));
    }

    let slots = fields
        .iter()
        .map(|(_, c)| c.iter().map(|&n| n as usize).sum::<usize>())
        .sum::<usize>();
    let samples = (0..slots * ir_points * channels)
        .map(|_| r.read_i24::<LittleEndian>().unwrap())
        .collect();
    let delays = (0..slots * channels).map(|_| r.read_u8().unwrap()).collect();
    assert!(r.is_empty(), "{} trailing bytes", r.len());

    Mhr {
        rate,
        channels,
        ir_points,
        fields,
        samples,
        delays,
    }
}

const GRID: [(usize, usize); 14] = [
    (0, 0),
    (1, 0),
    (1, 1),
    (1, 2),
    (1, 3),
    (2, 0),
    (2, 1),
    (2, 2),
    (2, 3),
    (3, 0),
    (3, 1),
    (3, 2),
    (3, 3),
    (4, 0),
];

/// A mono definition over `1,4,4,4,1` with one ASCII source per slot.
fn mono_definition(dir: &Path) -> PathBuf {
    let mut text = "rate = 44100\ntype = mono\npoints = 64\nradius = 0.09\ndistance = 1.0\nazimuths = 1, 4, 4, 4, 1\n\n"
        .to_string();
    for (i, (ei, ai)) in GRID.iter().enumerate() {
        let path = write_ascii(
            &dir.join(format!("src_{ei}_{ai}.txt")),
            &response(64, 4 + ai * 2 + ei, 1.0 - i as f64 * 0.02),
        );
        text.push_str(&format!("[ {ei}, {ai} ] = ascii(fp): \"{path}\"\n"));
    }
    let def = dir.join("mono.def");
    std::fs::write(&def, text).unwrap();
    def
}

#[test]
fn test_mono_ascii_dataset() {
    let dir = temp_dir("mono");
    let def = mono_definition(&dir);
    let out = process_definition(Some(&def), &options(&dir), &UnsupportedSofaReader).unwrap();
    assert_eq!(out, dir.join("out_44100.mhr"));

    let mhr = read_mhr(&out);
    assert_eq!(mhr.rate, 44100);
    assert_eq!(mhr.channels, 1);
    assert_eq!(mhr.ir_points, 32);
    assert_eq!(mhr.fields, vec![(1000, vec![1, 4, 4, 4, 1])]);
    assert_eq!(mhr.samples.len(), 14 * 32);
    assert_eq!(std::fs::metadata(&out).unwrap().len(), 21 + 3 + 5 + 14 * 32 * 3 + 14);

    assert!(mhr.samples.iter().all(|s| (-(1 << 23)..1 << 23).contains(s)));
    assert!(mhr.samples.iter().any(|s| s.abs() > 1 << 20));
    assert_eq!(*mhr.delays.iter().min().unwrap(), 0);
    assert!(*mhr.delays.iter().max().unwrap() <= 63 * 4);
}

#[test]
fn test_reruns_are_byte_identical() {
    let dir = temp_dir("rerun");
    let def = mono_definition(&dir);
    let first = process_definition(Some(&def), &options(&dir), &UnsupportedSofaReader).unwrap();
    let a = std::fs::read(&first).unwrap();
    let second = process_definition(Some(&def), &options(&dir), &UnsupportedSofaReader).unwrap();
    let b = std::fs::read(&second).unwrap();
    assert_eq!(first, second);
    assert!(a == b, "outputs differ");
}

#[test]
fn test_stereo_mixed_formats_resampled() {
    let dir = temp_dir("stereo");
    let mut text = "rate = 44100\ntype = stereo\npoints = 64\nradius = 0.09\ndistance = 1.0\nazimuths = 1, 4, 4, 4, 1\n"
        .to_string();
    for (ei, ai) in GRID {
        let left = write_bin_le(
            &dir.join(format!("l_{ei}_{ai}.bin")),
            &response(64, 4 + ai, 0.9),
        );
        let right = write_wave(
            &dir.join(format!("r_{ei}_{ai}.wav")),
            44100,
            &response(64, 8 - ai, 0.7),
        );
        text.push_str(&format!(
            "[ {ei}, {ai} ] = bin_le(fp, 8): \"{left}\" left + wave(0): \"{right}\" right\n"
        ));
    }
    let def = dir.join("stereo.def");
    std::fs::write(&def, text).unwrap();

    let options = ProcessingOptions {
        output_rate: Some(48000),
        ..options(&dir)
    };
    let out = process_definition(Some(&def), &options, &UnsupportedSofaReader).unwrap();
    assert_eq!(out, dir.join("out_48000.mhr"));

    let mhr = read_mhr(&out);
    assert_eq!(mhr.rate, 48000);
    assert_eq!(mhr.channels, 2);
    assert_eq!(mhr.samples.len(), 14 * 32 * 2);
    assert_eq!(mhr.delays.len(), 28);
    // Each ear reaches zero somewhere.
    assert!(mhr.delays.iter().step_by(2).any(|d| *d == 0));
    assert!(mhr.delays.iter().skip(1).step_by(2).any(|d| *d == 0));
}

#[test]
fn test_two_fields_and_farfield() {
    let dir = temp_dir("fields");
    let mut text =
        "rate = 44100\npoints = 64\nradius = 0.09\ndistance = 0.5, 1.5\nazimuths = 1, 4, 4, 4, 1; 1, 4, 4, 4, 1\n"
            .to_string();
    for fi in 0..2 {
        // The near field only has the upper hemisphere; the rest is synthesized.
        for (ei, ai) in GRID.iter().filter(|(ei, _)| fi == 1 || *ei >= 2) {
            let path = write_ascii(
                &dir.join(format!("src_{fi}_{ei}_{ai}.txt")),
                &response(64, 3 + fi * 3 + ai, 0.5 + fi as f64 * 0.3),
            );
            text.push_str(&format!("[ {fi}, {ei}, {ai} ] = ascii(fp): \"{path}\"\n"));
        }
    }
    let def = dir.join("fields.def");
    std::fs::write(&def, text).unwrap();

    let out = process_definition(Some(&def), &options(&dir), &UnsupportedSofaReader).unwrap();
    let mhr = read_mhr(&out);
    assert_eq!(
        mhr.fields,
        vec![(1500, vec![1, 4, 4, 4, 1]), (500, vec![1, 4, 4, 4, 1])]
    );
    assert_eq!(mhr.delays.len(), 28);

    let options = ProcessingOptions {
        farfield: true,
        output: dir.join("far.mhr").to_string_lossy().into_owned(),
        ..options(&dir)
    };
    let out = process_definition(Some(&def), &options, &UnsupportedSofaReader).unwrap();
    assert_eq!(read_mhr(&out).fields, vec![(1500, vec![1, 4, 4, 4, 1])]);
}

#[test]
fn test_sphere_model_without_equalization() {
    let dir = temp_dir("sphere");
    let def = mono_definition(&dir);
    let options = ProcessingOptions {
        head_model: HeadModel::Sphere,
        custom_radius: 0.1,
        equalize: false,
        limit: 0.0,
        ..options(&dir)
    };
    let mhr = read_mhr(&process_definition(Some(&def), &options, &UnsupportedSofaReader).unwrap());
    // Straight right on the horizontal plane is the farthest from the left ear.
    let right = mhr.delays[6];
    assert_eq!(*mhr.delays.iter().max().unwrap(), right);
    assert!(right > 0);
    // Front and back are the same distance from either side.
    assert_eq!(mhr.delays[5], mhr.delays[7]);
    assert_eq!(mhr.delays[1], mhr.delays[3]);
}

#[test]
fn test_distance_below_radius_writes_nothing() {
    let dir = temp_dir("radius");
    let def = dir.join("bad.def");
    std::fs::write(
        &def,
        "rate = 44100\npoints = 64\nradius = 0.15\ndistance = 0.1\nazimuths = 1, 4, 4, 4, 1\n[0, 0, 0] = ascii(fp): \"missing.txt\"\n",
    )
    .unwrap();
    let err = process_definition(Some(&def), &options(&dir), &UnsupportedSofaReader).unwrap_err();
    let parse = err.as_parse().unwrap();
    assert_eq!(parse.file, "bad.def");
    assert_eq!(parse.message, "Distance cannot start below head radius.");
    assert!(!dir.join("out_44100.mhr").exists());
}

#[test]
fn test_missing_input() {
    let dir = temp_dir("missing");
    let err = process_definition(Some(&dir.join("nope.def")), &options(&dir), &UnsupportedSofaReader).unwrap_err();
    assert!(err.is_source(), "{err}");
}

/// Serves one measurement set for any path.
struct OneSet(SofaMeasurements);

impl SofaReader for OneSet {
    fn read(&self, _path: &Path) -> Result<SofaMeasurements, SofaError> {
        Ok(self.0.clone())
    }
}

fn sofa_set() -> SofaMeasurements {
    let mut positions = vec![];
    let mut impulses = vec![];
    for (ei, count) in [1usize, 4, 4, 4, 1].into_iter().enumerate() {
        for ai in 0..count {
            let az = ai as f64 * 360.0 / count as f64;
            positions.push(spherical_to_cartesian([az, -90.0 + ei as f64 * 45.0, 1.0]));
            impulses.extend(response(64, 4 + ai, 0.8));
            impulses.extend(response(64, 6 + ai, 0.6));
        }
    }
    SofaMeasurements {
        sample_rate: 48000.0,
        emitters: 1,
        receivers: 2,
        samples: 64,
        positions,
        impulses,
        delays: SofaDelays::PerReceiver(vec![0.0, 1.0]),
    }
}

#[test]
fn test_sofa_input() {
    let dir = temp_dir("sofa");
    let input = dir.join("measured.sofa");
    std::fs::write(&input, b"\x89HDF\r\n\x1a\n").unwrap();

    let out = process_definition(Some(&input), &options(&dir), &OneSet(sofa_set())).unwrap();
    let mhr = read_mhr(&out);
    assert_eq!(mhr.rate, 48000);
    assert_eq!(mhr.channels, 2);
    assert_eq!(mhr.fields, vec![(1000, vec![1, 4, 4, 4, 1])]);

    let mono_options = ProcessingOptions {
        channel_mode: ChannelMode::ForceMono,
        output: dir.join("mono.mhr").to_string_lossy().into_owned(),
        ..options(&dir)
    };
    let mhr = read_mhr(&process_definition(Some(&input), &mono_options, &OneSet(sofa_set())).unwrap());
    assert_eq!(mhr.channels, 1);

    // Without a reader the container is reported as unsupported.
    let err = process_definition(Some(&input), &options(&dir), &UnsupportedSofaReader).unwrap_err();
    assert!(err.is_sofa(), "{err}");
}
