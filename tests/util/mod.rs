use std::path::Path;

use corpus_search::model::{CorpusDocument, Domain};
use corpus_search::music::Pitch;
use corpus_search::search::tantivy::{TantivyIndex, domain_index_dir};
use tempfile::TempDir;

/// Captures tracing output for tests.
#[allow(dead_code)]
pub struct TestTracing {
    buffer: std::sync::Arc<std::sync::Mutex<Vec<u8>>>,
}

#[allow(dead_code)]
impl TestTracing {
    pub fn new() -> Self {
        Self {
            buffer: std::sync::Arc::new(std::sync::Mutex::new(Vec::new())),
        }
    }

    pub fn install(&self) -> tracing::subscriber::DefaultGuard {
        let writer = self.buffer.clone();
        let make_writer = move || TestWriter(writer.clone());
        let subscriber = tracing_subscriber::fmt()
            .with_ansi(false)
            .without_time()
            .with_max_level(tracing::Level::DEBUG)
            .with_writer(make_writer)
            .finish();
        tracing::subscriber::set_default(subscriber)
    }

    pub fn output(&self) -> String {
        let buf = self.buffer.lock().unwrap();
        String::from_utf8_lossy(&buf).to_string()
    }

    /// Assert that the captured log output contains the provided substring.
    pub fn assert_contains(&self, needle: &str) {
        let out = self.output();
        assert!(
            out.contains(needle),
            "expected logs to contain `{needle}`, got:\n{out}"
        );
    }
}

#[allow(dead_code)]
struct TestWriter(std::sync::Arc<std::sync::Mutex<Vec<u8>>>);

impl std::io::Write for TestWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let mut guard = self.0.lock().unwrap();
        guard.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

#[allow(dead_code)]
pub fn pitches(values: &[i64]) -> Vec<Pitch> {
    values.iter().map(|v| Pitch::new(*v).unwrap()).collect()
}

/// Score documents in two corpora, `X` and `Y`.
///
/// | id | corpus | contour (relative) | rhythm / rests | meter |
/// |----|--------|--------------------|----------------|-------|
/// | x1 | X | 2 2 1 2 | 1/1 1/1 1/1, 0 | 3/4 |
/// | y1 | Y | 2 2 | 1/1 1/2 1/2 2/1, 0 | 4/4 |
/// | y2 | Y | 7 5 | 3/2 1/2 3/2, 1 | 6/8 |
/// | y3 | Y | 1 1 1 | 1/1 1/1, 0 | 2/4 |
/// | y4 | Y | none | none | none |
#[allow(dead_code)]
pub fn xml_documents() -> Vec<CorpusDocument> {
    let melody = |values: &[i64]| {
        let p = pitches(values);
        let lo = *p.iter().min().unwrap();
        let hi = *p.iter().max().unwrap();
        (p, lo, hi)
    };

    let (m, lo, hi) = melody(&[60, 62, 64, 65, 67]);
    let x1 = CorpusDocument::new("x1", "X")
        .with_title("Shared tune")
        .with_key("G")
        .with_time_signature("3/4")
        .with_tempo(100)
        .with_ambitus(lo, hi)
        .with_melody(&m)
        .with_rhythm("1/1 1/1 1/1", 0);

    let (m, lo, hi) = melody(&[60, 62, 64]);
    let y1 = CorpusDocument::new("y1", "Y")
        .with_title("Shared tune")
        .with_key("G")
        .with_time_signature("4/4")
        .with_tempo(100)
        .with_ambitus(lo, hi)
        .with_melody(&m)
        .with_rhythm("1/1 1/2 1/2 2/1", 0);

    let (m, lo, hi) = melody(&[60, 67, 72]);
    let y2 = CorpusDocument::new("y2", "Y")
        .with_title("Leaping song")
        .with_key("D")
        .with_alternate_keys(["b"])
        .with_time_signature("6/8")
        .with_tempo(140)
        .with_ambitus(lo, hi)
        .with_melody(&m)
        .with_rhythm("3/2 1/2 3/2", 1);

    let (m, lo, hi) = melody(&[64, 65, 66, 67]);
    let y3 = CorpusDocument::new("y3", "Y")
        .with_title("Chromatic line")
        .with_key("C")
        .with_time_signature("2/4")
        .with_ambitus(lo, hi)
        .with_melody(&m)
        .with_rhythm("1/1 1/1", 0);

    let y4 = CorpusDocument::new("y4", "Y").with_title("Untitled fragment");

    vec![x1, y1, y2, y3, y4]
}

#[allow(dead_code)]
pub fn audio_documents() -> Vec<CorpusDocument> {
    vec![
        CorpusDocument::new("a1", "field")
            .with_title("Harvest recording")
            .with_bpm([92.0, 184.0])
            .with_duration(120.0),
        CorpusDocument::new("a2", "field")
            .with_title("Wedding dance")
            .with_bpm([131.0])
            .with_duration(45.0),
    ]
}

#[allow(dead_code)]
pub fn write_index(data_dir: &Path, domain: Domain, docs: &[CorpusDocument]) {
    let mut index = TantivyIndex::open_or_create(&domain_index_dir(data_dir, domain)).unwrap();
    for doc in docs {
        index.add_document(doc).unwrap();
    }
    index.commit().unwrap();
}

/// Data dir holding both domain indexes.
#[allow(dead_code)]
pub fn fixture_data_dir() -> TempDir {
    let dir = TempDir::new().expect("tempdir");
    write_index(dir.path(), Domain::Xml, &xml_documents());
    write_index(dir.path(), Domain::Audio, &audio_documents());
    dir
}
