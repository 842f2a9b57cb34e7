// Integration tests for WAV file reading (worker-side chunk loading).

use anyhow::Result;
use tempfile::TempDir;
use voxnote::AudioFile;

fn write_fixture(path: &std::path::Path, samples: &[i16]) -> Result<()> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: 16000,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut writer = hound::WavWriter::create(path, spec)?;
    for &s in samples {
        writer.write_sample(s)?;
    }
    writer.finalize()?;
    Ok(())
}

#[test]
fn audio_file_open_reads_all_samples() -> Result<()> {
    let temp = TempDir::new()?;
    let path = temp.path().join("fixture.wav");
    write_fixture(&path, &vec![100i16; 16000])?;

    let audio = AudioFile::open(&path)?;

    assert_eq!(audio.sample_rate, 16000);
    assert_eq!(audio.channels, 1);
    assert_eq!(audio.samples.len(), 16000);
    assert!((audio.duration_seconds - 1.0).abs() < 0.001);
    assert!(audio.path.contains("fixture.wav"));

    Ok(())
}

#[test]
fn audio_file_converts_to_normalized_f32() -> Result<()> {
    let temp = TempDir::new()?;
    let path = temp.path().join("fixture.wav");
    write_fixture(&path, &[0, i16::MAX, -i16::MAX])?;

    let audio = AudioFile::open(&path)?;
    let f32s = audio.to_f32();

    assert_eq!(f32s.len(), 3);
    assert_eq!(f32s[0], 0.0);
    assert!((f32s[1] - 1.0).abs() < 0.0001);
    assert!((f32s[2] + 1.0).abs() < 0.0001);

    Ok(())
}

#[test]
fn audio_file_nonexistent_path_fails() {
    let result = AudioFile::open("/nonexistent/path/to/audio.wav");
    assert!(result.is_err());
}
