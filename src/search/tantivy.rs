use std::ops::Bound;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Value as JsonValue, json};
use tantivy::aggregation::AggregationCollector;
use tantivy::aggregation::agg_req::Aggregations;
use tantivy::collector::{Count, TopDocs};
use tantivy::query::{
    AllQuery, BooleanQuery, EmptyQuery, FuzzyTermQuery, Occur, PhraseQuery, Query, RangeQuery,
    TermQuery, TermSetQuery,
};
use tantivy::schema::*;
use tantivy::tokenizer::{TextAnalyzer, TokenStream, WhitespaceTokenizer};
use tantivy::{Index, IndexReader, IndexWriter, TantivyDocument};

use crate::corpus::{CorpusId, ScopedQuery};
use crate::model::{Ambitus, CorpusDocument, Domain, MetadataField, ScoredDocument};
use crate::music::Pitch;
use crate::search::facets::{
    FacetRequest, FacetRequests, FacetResult, FacetResults, HistogramBucket, Stats, TermBucket,
    fill_histogram,
};
use crate::search::fragment::{FieldKind, IndexField, Number, QueryNode};
use crate::search::query::{DocumentIndex, RetrievalError, RetrievedPage};

const SCHEMA_VERSION: &str = "v1";

/// Whitespace-only tokenizer so `-3` and `1/2` stay single tokens.
pub const SEQUENCE_TOKENIZER: &str = "sequence";

const CORPUS_ID_LIMIT: u32 = 65_000;

/// Knobs for the metadata free-text query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TextSearchSettings {
    /// Positions a multi-word phrase may be spread over.
    pub phrase_slop: u32,
    /// Levenshtein distance for single-word queries.
    pub fuzzy_distance: u8,
    /// Shorter single words are matched exactly.
    pub fuzzy_min_chars: usize,
}

impl Default for TextSearchSettings {
    fn default() -> Self {
        Self {
            phrase_slop: 2,
            fuzzy_distance: 1,
            fuzzy_min_chars: 4,
        }
    }
}

#[derive(Clone, Copy)]
pub struct Fields {
    pub doc_id: Field,
    pub corpus_id: Field,
    pub key: Field,
    pub alternate_keys: Field,
    pub time_signature: Field,
    pub fields_present: Field,
    pub tempo: Field,
    pub bpm: Field,
    pub duration: Field,
    pub ambitus_semitones: Field,
    pub min_note: Field,
    pub max_note: Field,
    pub rest_count: Field,
    pub rhythm_string: Field,
    pub contour_absolute: Field,
    pub contour_relative: Field,
    pub title: Field,
    pub author: Field,
    pub composer: Field,
    pub lyricist: Field,
    pub movement_name: Field,
    pub copyright: Field,
}

impl Fields {
    pub fn get(&self, field: IndexField) -> Field {
        match field {
            IndexField::DocId => self.doc_id,
            IndexField::CorpusId => self.corpus_id,
            IndexField::Key => self.key,
            IndexField::AlternateKeys => self.alternate_keys,
            IndexField::TimeSignature => self.time_signature,
            IndexField::FieldsPresent => self.fields_present,
            IndexField::Tempo => self.tempo,
            IndexField::Bpm => self.bpm,
            IndexField::Duration => self.duration,
            IndexField::AmbitusSemitones => self.ambitus_semitones,
            IndexField::MinNote => self.min_note,
            IndexField::MaxNote => self.max_note,
            IndexField::RestCount => self.rest_count,
            IndexField::RhythmString => self.rhythm_string,
            IndexField::ContourAbsolute => self.contour_absolute,
            IndexField::ContourRelative => self.contour_relative,
            IndexField::Metadata(m) => self.metadata(m),
        }
    }

    pub fn metadata(&self, field: MetadataField) -> Field {
        match field {
            MetadataField::Title => self.title,
            MetadataField::Author => self.author,
            MetadataField::Composer => self.composer,
            MetadataField::Lyricist => self.lyricist,
            MetadataField::MovementName => self.movement_name,
            MetadataField::Copyright => self.copyright,
        }
    }
}

/// Writer side of one domain's index, used to build fixtures and small corpora.
pub struct TantivyIndex {
    pub index: Index,
    writer: IndexWriter,
    pub fields: Fields,
}

impl TantivyIndex {
    pub fn open_or_create(path: &Path) -> Result<Self> {
        let index = open_or_create_index(path)?;
        // Single thread keeps document order equal to insertion order.
        let writer = index
            .writer_with_num_threads(1, 50_000_000)
            .with_context(|| "create index writer")?;
        let fields = fields_from_schema(&index.schema())?;

        Ok(Self {
            index,
            writer,
            fields,
        })
    }

    pub fn add_document(&mut self, doc: &CorpusDocument) -> Result<()> {
        self.writer.add_document(to_tantivy_document(&self.fields, doc))?;
        Ok(())
    }

    pub fn commit(&mut self) -> Result<()> {
        self.writer.commit()?;
        Ok(())
    }

    pub fn reader(&self) -> Result<IndexReader> {
        Ok(self.index.reader()?)
    }
}

/// `<data_dir>/index/<domain>/v1`
pub fn domain_index_dir(data_dir: &Path, domain: Domain) -> PathBuf {
    data_dir
        .join("index")
        .join(domain.as_str())
        .join(SCHEMA_VERSION)
}

fn open_or_create_index(path: &Path) -> Result<Index> {
    std::fs::create_dir_all(path)
        .with_context(|| format!("creating index directory {}", path.display()))?;
    let index = if path.join("meta.json").exists() {
        Index::open_in_dir(path)?
    } else {
        Index::create_in_dir(path, build_schema())?
    };
    register_tokenizers(&index);
    Ok(index)
}

/// Register the sequence tokenizer. Required before indexing or querying.
pub fn register_tokenizers(index: &Index) {
    let sequence = TextAnalyzer::builder(WhitespaceTokenizer::default()).build();
    index.tokenizers().register(SEQUENCE_TOKENIZER, sequence);
}

pub fn build_schema() -> Schema {
    let mut schema_builder = Schema::builder();
    for name in [
        "doc_id",
        "corpus_id",
        "key",
        "alternate_keys",
        "time_signature",
        "fields_present",
    ] {
        schema_builder.add_text_field(name, STRING | STORED | FAST);
    }
    for name in [
        "tempo",
        "ambitus_semitones",
        "min_note",
        "max_note",
        "rest_count",
    ] {
        schema_builder.add_i64_field(name, INDEXED | STORED | FAST);
    }
    schema_builder.add_f64_field("bpm", INDEXED | STORED | FAST);
    schema_builder.add_f64_field("duration", INDEXED | STORED | FAST);

    let sequence = TextOptions::default()
        .set_indexing_options(
            TextFieldIndexing::default()
                .set_tokenizer(SEQUENCE_TOKENIZER)
                .set_index_option(IndexRecordOption::WithFreqsAndPositions),
        )
        .set_stored();
    for name in ["rhythm_string", "contour_absolute", "contour_relative"] {
        schema_builder.add_text_field(name, sequence.clone());
    }
    for field in MetadataField::ALL {
        schema_builder.add_text_field(field.index_name(), TEXT | STORED);
    }
    schema_builder.build()
}

pub fn fields_from_schema(schema: &Schema) -> Result<Fields> {
    let get = |name: &str| {
        schema
            .get_field(name)
            .map_err(|_| anyhow::anyhow!("schema missing {name}"))
    };
    Ok(Fields {
        doc_id: get("doc_id")?,
        corpus_id: get("corpus_id")?,
        key: get("key")?,
        alternate_keys: get("alternate_keys")?,
        time_signature: get("time_signature")?,
        fields_present: get("fields_present")?,
        tempo: get("tempo")?,
        bpm: get("bpm")?,
        duration: get("duration")?,
        ambitus_semitones: get("ambitus_semitones")?,
        min_note: get("min_note")?,
        max_note: get("max_note")?,
        rest_count: get("rest_count")?,
        rhythm_string: get("rhythm_string")?,
        contour_absolute: get("contour_absolute")?,
        contour_relative: get("contour_relative")?,
        title: get(MetadataField::Title.index_name())?,
        author: get(MetadataField::Author.index_name())?,
        composer: get(MetadataField::Composer.index_name())?,
        lyricist: get(MetadataField::Lyricist.index_name())?,
        movement_name: get(MetadataField::MovementName.index_name())?,
        copyright: get(MetadataField::Copyright.index_name())?,
    })
}

/// Optional fields are only added when set, and recorded in `fields_present`.
pub fn to_tantivy_document(fields: &Fields, doc: &CorpusDocument) -> TantivyDocument {
    let mut d = TantivyDocument::default();
    d.add_text(fields.doc_id, &doc.id);
    d.add_text(fields.corpus_id, &doc.corpus_id);

    let present = |d: &mut TantivyDocument, field: IndexField| {
        d.add_text(fields.fields_present, field.name());
    };

    for m in MetadataField::ALL {
        if let Some(value) = doc.metadata.get(m) {
            d.add_text(fields.metadata(m), value);
        }
    }
    if let Some(key) = &doc.key {
        d.add_text(fields.key, key);
        present(&mut d, IndexField::Key);
    }
    for alt in &doc.alternate_keys {
        d.add_text(fields.alternate_keys, alt);
    }
    for ts in &doc.time_signatures {
        d.add_text(fields.time_signature, ts);
    }
    if !doc.time_signatures.is_empty() {
        present(&mut d, IndexField::TimeSignature);
    }
    if let Some(tempo) = doc.tempo {
        d.add_i64(fields.tempo, tempo);
        present(&mut d, IndexField::Tempo);
    }
    if let Some(ambitus) = doc.ambitus {
        d.add_i64(fields.min_note, i64::from(ambitus.min_note));
        d.add_i64(fields.max_note, i64::from(ambitus.max_note));
        d.add_i64(fields.ambitus_semitones, ambitus.semitones());
        present(&mut d, IndexField::AmbitusSemitones);
    }
    if let Some(contour) = &doc.contour_absolute {
        d.add_text(fields.contour_absolute, contour);
        present(&mut d, IndexField::ContourAbsolute);
    }
    if let Some(contour) = &doc.contour_relative {
        d.add_text(fields.contour_relative, contour);
        present(&mut d, IndexField::ContourRelative);
    }
    if let Some(rhythm) = &doc.rhythm {
        d.add_text(fields.rhythm_string, rhythm);
        present(&mut d, IndexField::RhythmString);
    }
    if let Some(rests) = doc.rest_count {
        d.add_i64(fields.rest_count, i64::from(rests));
        present(&mut d, IndexField::RestCount);
    }
    for bpm in &doc.bpm {
        d.add_f64(fields.bpm, *bpm);
    }
    if let Some(duration) = doc.duration_secs {
        d.add_f64(fields.duration, duration);
    }
    d
}

pub fn from_tantivy_document(
    fields: &Fields,
    d: &TantivyDocument,
) -> std::result::Result<CorpusDocument, RetrievalError> {
    let text = |field: Field| {
        d.get_first(field)
            .and_then(|v| v.as_str())
            .map(str::to_string)
    };
    let texts = |field: Field| -> Vec<String> {
        d.get_all(field)
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect()
    };
    let int = |field: Field| d.get_first(field).and_then(|v| v.as_i64());

    let id = text(fields.doc_id).unwrap_or_default();
    let corrupt = |reason: String| RetrievalError::CorruptDocument {
        doc_id: id.clone(),
        reason,
    };

    let mut doc = CorpusDocument::new(id.clone(), text(fields.corpus_id).unwrap_or_default());
    for m in MetadataField::ALL {
        if let Some(value) = text(fields.metadata(m)) {
            doc.metadata.set(m, value);
        }
    }
    doc.key = text(fields.key);
    doc.alternate_keys = texts(fields.alternate_keys);
    doc.time_signatures = texts(fields.time_signature);
    doc.tempo = int(fields.tempo);
    doc.ambitus = match (int(fields.min_note), int(fields.max_note)) {
        (Some(lo), Some(hi)) => Some(Ambitus {
            min_note: Pitch::new(lo).map_err(|e| corrupt(e.to_string()))?,
            max_note: Pitch::new(hi).map_err(|e| corrupt(e.to_string()))?,
        }),
        _ => None,
    };
    doc.contour_absolute = text(fields.contour_absolute);
    doc.contour_relative = text(fields.contour_relative);
    doc.rhythm = text(fields.rhythm_string);
    doc.rest_count = int(fields.rest_count)
        .map(|r| u32::try_from(r).map_err(|_| corrupt(format!("rest count {r}"))))
        .transpose()?;
    doc.bpm = d
        .get_all(fields.bpm)
        .filter_map(|v| v.as_f64())
        .collect();
    doc.duration_secs = d.get_first(fields.duration).and_then(|v| v.as_f64());
    Ok(doc)
}

struct DomainIndex {
    index: Index,
    reader: IndexReader,
    fields: Fields,
}

impl DomainIndex {
    fn open(path: &Path) -> Result<Self> {
        let index = open_or_create_index(path)?;
        let fields = fields_from_schema(&index.schema())?;
        let reader = index.reader()?;
        Ok(Self {
            index,
            reader,
            fields,
        })
    }
}

/// The two domain indexes under one data directory.
pub struct TantivyCorpusIndex {
    xml: DomainIndex,
    audio: DomainIndex,
    text: TextSearchSettings,
}

impl TantivyCorpusIndex {
    pub fn open(data_dir: &Path, text: TextSearchSettings) -> Result<Self> {
        Ok(Self {
            xml: DomainIndex::open(&domain_index_dir(data_dir, Domain::Xml))
                .context("opening xml index")?,
            audio: DomainIndex::open(&domain_index_dir(data_dir, Domain::Audio))
                .context("opening audio index")?,
            text,
        })
    }

    fn domain(&self, domain: Domain) -> &DomainIndex {
        match domain {
            Domain::Xml => &self.xml,
            Domain::Audio => &self.audio,
        }
    }

    /// Translate a scoped query tree into a tantivy query for `domain`.
    pub fn to_query(
        &self,
        query: &ScopedQuery,
    ) -> std::result::Result<Box<dyn Query>, RetrievalError> {
        let target = self.domain(query.domain());
        Translator {
            index: &target.index,
            fields: &target.fields,
            text: self.text,
        }
        .translate(&query.query().clone().into_node())
    }
}

impl DocumentIndex for TantivyCorpusIndex {
    fn corpus_ids(&self, domain: Domain) -> std::result::Result<Vec<CorpusId>, RetrievalError> {
        let target = self.domain(domain);
        let searcher = target.reader.searcher();
        let requests = json!({
            "corpora": {"terms": {"field": "corpus_id", "size": CORPUS_ID_LIMIT}}
        });
        let results = run_aggregation(&searcher, &AllQuery, requests)?;
        Ok(term_buckets(&results["corpora"])
            .into_iter()
            .map(|b| b.key)
            .collect())
    }

    fn retrieve(
        &self,
        query: &ScopedQuery,
        offset: usize,
        limit: usize,
    ) -> std::result::Result<RetrievedPage, RetrievalError> {
        let target = self.domain(query.domain());
        let q = self.to_query(query)?;
        let searcher = target.reader.searcher();
        tracing::debug!(
            backend = "tantivy",
            domain = %query.domain(),
            limit = limit,
            offset = offset,
            "retrieve"
        );
        // Past the last document nothing can be returned; TopDocs sizes its buffer from
        // offset + limit, so those windows only count.
        let num_docs = usize::try_from(searcher.num_docs()).unwrap_or(usize::MAX);
        if limit == 0 || offset >= num_docs {
            let total = searcher.search(&q, &Count)?;
            return Ok(RetrievedPage {
                hits: Vec::new(),
                total,
            });
        }

        let (top_docs, total) =
            searcher.search(
                &q,
                &(TopDocs::with_limit(limit.min(num_docs)).and_offset(offset), Count),
            )?;
        let mut hits = Vec::with_capacity(top_docs.len());
        for (score, addr) in top_docs {
            let stored: TantivyDocument = searcher.doc(addr)?;
            hits.push(ScoredDocument::new(
                from_tantivy_document(&target.fields, &stored)?,
                score,
            ));
        }
        Ok(RetrievedPage { hits, total })
    }

    fn count(&self, query: &ScopedQuery) -> std::result::Result<usize, RetrievalError> {
        let target = self.domain(query.domain());
        let q = self.to_query(query)?;
        Ok(target.reader.searcher().search(&q, &Count)?)
    }

    fn aggregate(
        &self,
        query: &ScopedQuery,
        requests: &FacetRequests,
    ) -> std::result::Result<FacetResults, RetrievalError> {
        if requests.is_empty() {
            return Ok(FacetResults::new());
        }
        let target = self.domain(query.domain());
        let q = self.to_query(query)?;
        let searcher = target.reader.searcher();

        let mut body = serde_json::Map::new();
        for (name, request) in requests {
            body.insert(name.clone(), aggregation_json(request));
        }
        let results = run_aggregation(&searcher, q.as_ref(), JsonValue::Object(body))?;

        let mut out = FacetResults::new();
        for (name, request) in requests {
            let value = &results[name.as_str()];
            let result = match request {
                FacetRequest::Terms { .. } => FacetResult::Terms(term_buckets(value)),
                FacetRequest::Stats { .. } => FacetResult::Stats(stats(value)),
                FacetRequest::Histogram {
                    interval, min, max, ..
                } => FacetResult::Histogram(fill_histogram(
                    &histogram_buckets(value),
                    *interval,
                    *min,
                    *max,
                )),
            };
            out.insert(name.clone(), result);
        }
        Ok(out)
    }
}

fn aggregation_json(request: &FacetRequest) -> JsonValue {
    match request {
        FacetRequest::Terms { field, size } => {
            json!({"terms": {"field": field.name(), "size": size}})
        }
        FacetRequest::Stats { field } => json!({"stats": {"field": field.name()}}),
        FacetRequest::Histogram {
            field,
            interval,
            min,
            max,
        } => json!({"histogram": {
            "field": field.name(),
            "interval": interval,
            "min_doc_count": 0,
            "hard_bounds": {"min": min, "max": max}
        }}),
    }
}

fn run_aggregation(
    searcher: &tantivy::Searcher,
    query: &dyn Query,
    request: JsonValue,
) -> std::result::Result<JsonValue, RetrievalError> {
    let aggs: Aggregations = serde_json::from_value(request)
        .map_err(|e| RetrievalError::Aggregation(e.to_string()))?;
    let collector = AggregationCollector::from_aggs(aggs, Default::default());
    let results = searcher.search(query, &collector)?;
    serde_json::to_value(results).map_err(|e| RetrievalError::Aggregation(e.to_string()))
}

fn term_buckets(value: &JsonValue) -> Vec<TermBucket> {
    value["buckets"]
        .as_array()
        .map(|buckets| {
            buckets
                .iter()
                .filter_map(|b| {
                    let key = match &b["key"] {
                        JsonValue::String(s) => s.clone(),
                        JsonValue::Number(n) => n.to_string(),
                        _ => return None,
                    };
                    Some(TermBucket {
                        key,
                        doc_count: b["doc_count"].as_u64().unwrap_or(0),
                    })
                })
                .collect()
        })
        .unwrap_or_default()
}

fn stats(value: &JsonValue) -> Stats {
    Stats {
        count: value["count"].as_u64().unwrap_or(0),
        min: value["min"].as_f64(),
        max: value["max"].as_f64(),
        avg: value["avg"].as_f64(),
    }
}

fn histogram_buckets(value: &JsonValue) -> Vec<HistogramBucket> {
    value["buckets"]
        .as_array()
        .map(|buckets| {
            buckets
                .iter()
                .filter_map(|b| {
                    Some(HistogramBucket {
                        key: b["key"].as_f64()?,
                        doc_count: b["doc_count"].as_u64().unwrap_or(0),
                    })
                })
                .collect()
        })
        .unwrap_or_default()
}

/// Maps the backend-neutral tree onto tantivy queries for one domain index.
struct Translator<'a> {
    index: &'a Index,
    fields: &'a Fields,
    text: TextSearchSettings,
}

type Translated = std::result::Result<Box<dyn Query>, RetrievalError>;

impl Translator<'_> {
    fn translate(&self, node: &QueryNode) -> Translated {
        match node {
            QueryNode::All => Ok(Box::new(AllQuery)),
            QueryNode::Term { field, value } => Ok(Box::new(TermQuery::new(
                self.term(*field, value)?,
                IndexRecordOption::Basic,
            ))),
            QueryNode::AnyOf { field, values } => {
                if values.is_empty() {
                    return Ok(Box::new(EmptyQuery));
                }
                let terms = values
                    .iter()
                    .map(|v| self.term(*field, v))
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(Box::new(TermSetQuery::new(terms)))
            }
            QueryNode::Range { field, gte, lte } => self.range(*field, *gte, *lte),
            QueryNode::Phrase { field, tokens } => {
                let f = self.fields.get(*field);
                let mut terms: Vec<Term> = tokens
                    .iter()
                    .map(|t| Term::from_field_text(f, t))
                    .collect();
                match terms.len() {
                    0 => Ok(Box::new(AllQuery)),
                    1 => Ok(Box::new(TermQuery::new(
                        terms.remove(0),
                        IndexRecordOption::WithFreqs,
                    ))),
                    _ => Ok(Box::new(PhraseQuery::new(terms))),
                }
            }
            QueryNode::Text { fields, text } => self.text_query(fields, text),
            QueryNode::Exists { field } => Ok(Box::new(TermQuery::new(
                Term::from_field_text(self.fields.fields_present, field.name()),
                IndexRecordOption::Basic,
            ))),
            QueryNode::Or { nodes } => self.boolean(nodes, Occur::Should),
            QueryNode::And { nodes } => self.boolean(nodes, Occur::Must),
            QueryNode::Not { node } => Ok(Box::new(BooleanQuery::new(vec![
                (Occur::Must, Box::new(AllQuery) as Box<dyn Query>),
                (Occur::MustNot, self.translate(node)?),
            ]))),
        }
    }

    fn boolean(&self, nodes: &[QueryNode], occur: Occur) -> Translated {
        if nodes.is_empty() {
            return Ok(match occur {
                Occur::Should => Box::new(EmptyQuery),
                _ => Box::new(AllQuery),
            });
        }
        let clauses = nodes
            .iter()
            .map(|n| Ok((occur, self.translate(n)?)))
            .collect::<std::result::Result<Vec<_>, RetrievalError>>()?;
        Ok(Box::new(BooleanQuery::new(clauses)))
    }

    fn term(&self, field: IndexField, value: &str) -> std::result::Result<Term, RetrievalError> {
        let f = self.fields.get(field);
        match field.kind() {
            FieldKind::Keyword | FieldKind::Sequence | FieldKind::Text => {
                Ok(Term::from_field_text(f, value))
            }
            FieldKind::Integer => value
                .trim()
                .parse::<i64>()
                .map(|v| Term::from_field_i64(f, v))
                .map_err(|_| malformed(field, value)),
            FieldKind::Float => value
                .trim()
                .parse::<f64>()
                .map(|v| Term::from_field_f64(f, v))
                .map_err(|_| malformed(field, value)),
        }
    }

    fn range(&self, field: IndexField, gte: Option<Number>, lte: Option<Number>) -> Translated {
        let f = self.fields.get(field);
        let bound = |n: Option<Number>| -> std::result::Result<Bound<Term>, RetrievalError> {
            let Some(n) = n else {
                return Ok(Bound::Unbounded);
            };
            let term = match (field.kind(), n) {
                (FieldKind::Integer, Number::Int(v)) => Term::from_field_i64(f, v),
                (FieldKind::Integer, Number::Float(v)) => Term::from_field_i64(f, v.round() as i64),
                (FieldKind::Float, Number::Int(v)) => Term::from_field_f64(f, v as f64),
                (FieldKind::Float, Number::Float(v)) => Term::from_field_f64(f, v),
                _ => return Err(malformed(field, "range on non-numeric field")),
            };
            Ok(Bound::Included(term))
        };
        let (lower, upper) = (bound(gte)?, bound(lte)?);
        if matches!((&lower, &upper), (Bound::Unbounded, Bound::Unbounded)) {
            return Ok(Box::new(AllQuery));
        }
        Ok(Box::new(RangeQuery::new(lower, upper)))
    }

    /// Per field: one token is a (fuzzy) term, several are a sloppy phrase.
    fn text_query(&self, fields: &[IndexField], text: &str) -> Translated {
        let mut per_field: Vec<(Occur, Box<dyn Query>)> = Vec::new();
        for field in fields {
            let f = self.fields.get(*field);
            let mut analyzer = self.index.tokenizer_for_field(f)?;
            let mut stream = analyzer.token_stream(text);
            let mut tokens = Vec::new();
            while let Some(token) = stream.next() {
                tokens.push(token.text.clone());
            }
            let query: Box<dyn Query> = match tokens.len() {
                0 => continue,
                1 => {
                    let token = &tokens[0];
                    let term = Term::from_field_text(f, token);
                    if self.text.fuzzy_distance > 0
                        && token.chars().count() >= self.text.fuzzy_min_chars
                    {
                        Box::new(FuzzyTermQuery::new(term, self.text.fuzzy_distance, true))
                    } else {
                        Box::new(TermQuery::new(term, IndexRecordOption::WithFreqs))
                    }
                }
                _ => {
                    let terms = tokens.iter().map(|t| Term::from_field_text(f, t)).collect();
                    let mut phrase = PhraseQuery::new(terms);
                    phrase.set_slop(self.text.phrase_slop);
                    Box::new(phrase)
                }
            };
            per_field.push((Occur::Should, query));
        }
        if per_field.is_empty() {
            return Ok(Box::new(EmptyQuery));
        }
        Ok(Box::new(BooleanQuery::new(per_field)))
    }
}

fn malformed(field: IndexField, value: &str) -> RetrievalError {
    RetrievalError::MalformedQuery(format!("{}: {value:?}", field.name()))
}
