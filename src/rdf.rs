//! RDF export of the preprocessed table.
//!
//! Builds a small in-memory graph (one node per publication, linked to author
//! and affiliation nodes) and serializes it as RDF/XML.

use crate::affiliation::affiliation_names;
use crate::error::{AnalyzerError, Result};
use crate::table::{Publication, PublicationTable};
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use tracing::info;

pub const RDF_NS: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#";
pub const DCTERMS_NS: &str = "http://purl.org/dc/terms/";
pub const FOAF_NS: &str = "http://xmlns.com/foaf/0.1/";
pub const BIBO_NS: &str = "http://purl.org/ontology/bibo/";
pub const XSD_NS: &str = "http://www.w3.org/2001/XMLSchema#";

/// Base for minted node IRIs
pub const EX_BASE: &str = "http://example.org/";

/// Prefixes declared on the root element
const NAMESPACES: &[(&str, &str)] = &[
    ("rdf", RDF_NS),
    ("dcterms", DCTERMS_NS),
    ("foaf", FOAF_NS),
    ("bibo", BIBO_NS),
];

/// A predicate as a prefixed name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Predicate {
    pub prefix: &'static str,
    pub local: &'static str,
}

impl Predicate {
    const fn new(prefix: &'static str, local: &'static str) -> Self {
        Self { prefix, local }
    }

    /// `prefix:local`
    pub fn qname(&self) -> String {
        format!("{}:{}", self.prefix, self.local)
    }
}

pub mod vocab {
    use super::Predicate;

    pub const RDF_TYPE: Predicate = Predicate::new("rdf", "type");
    pub const DCTERMS_SUBJECT: Predicate = Predicate::new("dcterms", "subject");
    pub const DCTERMS_TITLE: Predicate = Predicate::new("dcterms", "title");
    pub const DCTERMS_IS_PART_OF: Predicate = Predicate::new("dcterms", "isPartOf");
    pub const DCTERMS_DATE: Predicate = Predicate::new("dcterms", "date");
    pub const DCTERMS_CREATOR: Predicate = Predicate::new("dcterms", "creator");
    pub const BIBO_DOI: Predicate = Predicate::new("bibo", "doi");
    pub const BIBO_VOLUME: Predicate = Predicate::new("bibo", "volume");
    pub const BIBO_ISSUE: Predicate = Predicate::new("bibo", "issue");
    pub const BIBO_PAGES: Predicate = Predicate::new("bibo", "pages");
    pub const BIBO_CITED_BY: Predicate = Predicate::new("bibo", "citedBy");
    pub const FOAF_NAME: Predicate = Predicate::new("foaf", "name");
    pub const FOAF_MEMBER: Predicate = Predicate::new("foaf", "member");
}

/// Object of a triple
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Object {
    Iri(String),
    Literal {
        value: String,
        datatype: Option<String>,
    },
}

impl Object {
    pub fn iri(iri: impl Into<String>) -> Self {
        Object::Iri(iri.into())
    }

    pub fn literal(value: impl Into<String>) -> Self {
        Object::Literal {
            value: value.into(),
            datatype: None,
        }
    }

    pub fn typed(value: impl Into<String>, xsd_type: &str) -> Self {
        Object::Literal {
            value: value.into(),
            datatype: Some(format!("{}{}", XSD_NS, xsd_type)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Triple {
    pub subject: String,
    pub predicate: Predicate,
    pub object: Object,
}

/// A set of triples that remembers insertion order
#[derive(Debug, Default)]
pub struct Graph {
    triples: Vec<Triple>,
    seen: HashSet<Triple>,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a triple; returns false when it was already present
    pub fn add(&mut self, subject: &str, predicate: Predicate, object: Object) -> bool {
        let triple = Triple {
            subject: subject.to_string(),
            predicate,
            object,
        };
        if self.seen.contains(&triple) {
            return false;
        }
        self.seen.insert(triple.clone());
        self.triples.push(triple);
        true
    }

    pub fn len(&self) -> usize {
        self.triples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.triples.is_empty()
    }

    pub fn triples(&self) -> &[Triple] {
        &self.triples
    }

    /// Serialize as RDF/XML, one `rdf:Description` per subject in order of
    /// first appearance.
    pub fn to_rdf_xml(&self) -> Result<String> {
        let mut order: Vec<&str> = Vec::new();
        let mut by_subject: HashMap<&str, Vec<&Triple>> = HashMap::new();
        for t in &self.triples {
            let entry = by_subject.entry(t.subject.as_str()).or_default();
            if entry.is_empty() {
                order.push(t.subject.as_str());
            }
            entry.push(t);
        }

        let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
        write(&mut writer, Event::Decl(BytesDecl::new("1.0", Some("utf-8"), None)))?;

        let mut root = BytesStart::new("rdf:RDF");
        for (prefix, ns) in NAMESPACES {
            root.push_attribute((format!("xmlns:{}", prefix).as_str(), *ns));
        }
        write(&mut writer, Event::Start(root))?;

        for subject in order {
            let mut description = BytesStart::new("rdf:Description");
            description.push_attribute(("rdf:about", subject));
            write(&mut writer, Event::Start(description))?;

            for t in by_subject.get(subject).map(Vec::as_slice).unwrap_or_default() {
                let qname = t.predicate.qname();
                match &t.object {
                    Object::Iri(iri) => {
                        let mut el = BytesStart::new(qname.as_str());
                        el.push_attribute(("rdf:resource", iri.as_str()));
                        write(&mut writer, Event::Empty(el))?;
                    }
                    Object::Literal { value, datatype } => {
                        let mut el = BytesStart::new(qname.as_str());
                        if let Some(dt) = datatype {
                            el.push_attribute(("rdf:datatype", dt.as_str()));
                        }
                        write(&mut writer, Event::Start(el))?;
                        write(&mut writer, Event::Text(BytesText::new(value)))?;
                        write(&mut writer, Event::End(BytesEnd::new(qname.as_str())))?;
                    }
                }
            }

            write(&mut writer, Event::End(BytesEnd::new("rdf:Description")))?;
        }

        write(&mut writer, Event::End(BytesEnd::new("rdf:RDF")))?;

        String::from_utf8(writer.into_inner()).map_err(|e| AnalyzerError::Rdf(e.to_string()))
    }
}

fn write(writer: &mut Writer<Vec<u8>>, event: Event<'_>) -> Result<()> {
    writer
        .write_event(event)
        .map_err(|e| AnalyzerError::Rdf(e.to_string()))
}

/// Identifier segment for a name: spaces become underscores, the rest is
/// percent-encoded
pub fn clean_uri(name: &str) -> String {
    urlencoding::encode(&name.replace(' ', "_")).into_owned()
}

fn publication_iri(index: usize) -> String {
    format!("{}publication/{}", EX_BASE, index)
}

fn author_iri(name: &str) -> String {
    format!("{}author/{}", EX_BASE, clean_uri(name))
}

fn affiliation_iri(name: &str) -> String {
    format!("{}affiliation/{}", EX_BASE, clean_uri(name))
}

/// Add the triples of one publication row
fn add_publication(graph: &mut Graph, index: usize, row: &Publication) {
    use vocab::*;

    let pub_iri = publication_iri(index);
    graph.add(&pub_iri, RDF_TYPE, Object::iri(format!("{}Document", BIBO_NS)));
    graph.add(&pub_iri, DCTERMS_SUBJECT, Object::literal(&row.topic));
    graph.add(&pub_iri, DCTERMS_TITLE, Object::literal(&row.title));
    graph.add(&pub_iri, DCTERMS_IS_PART_OF, Object::literal(&row.publication_name));

    for (predicate, value) in [
        (BIBO_DOI, &row.doi),
        (BIBO_VOLUME, &row.volume),
        (BIBO_ISSUE, &row.issue),
        (BIBO_PAGES, &row.page_range),
    ] {
        if !value.trim().is_empty() {
            graph.add(&pub_iri, predicate, Object::literal(value));
        }
    }

    if let Some(date) = row.cover_date {
        graph.add(
            &pub_iri,
            DCTERMS_DATE,
            Object::typed(date.format("%Y-%m-%d").to_string(), "date"),
        );
    }
    graph.add(
        &pub_iri,
        BIBO_CITED_BY,
        Object::typed(row.citations().to_string(), "double"),
    );

    let affiliations = affiliation_names(&row.affiliation);
    for author in row.author_names() {
        let author_iri = author_iri(author);
        graph.add(&author_iri, RDF_TYPE, Object::iri(format!("{}Person", FOAF_NS)));
        graph.add(&author_iri, FOAF_NAME, Object::literal(author));
        graph.add(&pub_iri, DCTERMS_CREATOR, Object::iri(&author_iri));

        for affil in &affiliations {
            let affil_iri = affiliation_iri(affil);
            graph.add(&affil_iri, RDF_TYPE, Object::iri(format!("{}Organization", FOAF_NS)));
            graph.add(&affil_iri, FOAF_NAME, Object::literal(affil));
            graph.add(&author_iri, FOAF_MEMBER, Object::iri(&affil_iri));
        }
    }
}

/// Build a graph from `(row_index, row)` pairs
pub fn build_graph<'a>(rows: impl IntoIterator<Item = (usize, &'a Publication)>) -> Graph {
    let mut graph = Graph::new();
    for (index, row) in rows {
        add_publication(&mut graph, index, row);
    }
    graph
}

/// Export the first `limit` rows of `topic` as RDF/XML to `path`.
///
/// Returns the number of publications exported.
pub fn export_topic(
    table: &PublicationTable,
    topic: &str,
    limit: usize,
    path: &Path,
) -> Result<usize> {
    let rows: Vec<(usize, &Publication)> = table.topic_rows(topic).take(limit).collect();
    let exported = rows.len();
    let graph = build_graph(rows);

    let xml = graph.to_rdf_xml()?;
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    std::fs::write(path, xml)?;

    info!(
        topic = %topic,
        publications = exported,
        triples = graph.len(),
        path = %path.display(),
        "RDF data written"
    );
    Ok(exported)
}

#[cfg(test)]
mod tests {
    use super::vocab::*;
    use super::*;
    use chrono::NaiveDate;
    use tempfile::TempDir;

    fn row(topic: &str, title: &str) -> Publication {
        Publication {
            topic: topic.to_string(),
            title: title.to_string(),
            authors: "Smith J., Doe A.".to_string(),
            publication_name: "Nature".to_string(),
            doi: "10.1/x".to_string(),
            cover_date: NaiveDate::from_ymd_opt(2020, 1, 2),
            affiliation: "[{'affilname': 'MIT', 'affiliation-country': 'USA'}]".to_string(),
            citedby_count: Some(0.25),
            ..Default::default()
        }
    }

    #[test]
    fn test_clean_uri() {
        assert_eq!(clean_uri("Smith J."), "Smith_J.");
        assert_eq!(clean_uri("Université de Paris"), "Universit%C3%A9_de_Paris");
    }

    #[test]
    fn test_graph_deduplicates_triples() {
        let mut g = Graph::new();
        assert!(g.add("s", FOAF_NAME, Object::literal("x")));
        assert!(!g.add("s", FOAF_NAME, Object::literal("x")));
        assert_eq!(g.len(), 1);
    }

    #[test]
    fn test_publication_links() {
        let r = row("COMP", "T");
        let g = build_graph([(7, &r)]);
        let pub_iri = "http://example.org/publication/7";
        let smith = "http://example.org/author/Smith_J.";
        let mit = "http://example.org/affiliation/MIT";

        let has = |s: &str, p: Predicate, o: &Object| {
            g.triples()
                .iter()
                .any(|t| t.subject == s && t.predicate == p && &t.object == o)
        };
        assert!(has(pub_iri, DCTERMS_CREATOR, &Object::iri(smith)));
        assert!(has(smith, FOAF_MEMBER, &Object::iri(mit)));
        assert!(has(mit, FOAF_NAME, &Object::literal("MIT")));
        assert!(has(pub_iri, BIBO_CITED_BY, &Object::typed("0.25", "double")));
        // empty optional fields are skipped
        assert!(!g.triples().iter().any(|t| t.predicate == BIBO_VOLUME));
        // affiliation node added once even with two authors
        let org_types = g
            .triples()
            .iter()
            .filter(|t| t.subject == mit && t.predicate == RDF_TYPE)
            .count();
        assert_eq!(org_types, 1);
    }

    #[test]
    fn test_rdf_xml_shape() -> Result<()> {
        let mut r = row("COMP", "Fish & <Chips>");
        r.volume = "12".to_string();
        let xml = build_graph([(0, &r)]).to_rdf_xml()?;

        assert!(xml.starts_with("<?xml"));
        assert!(xml.contains(r#"xmlns:bibo="http://purl.org/ontology/bibo/""#));
        assert!(xml.contains(r#"<rdf:Description rdf:about="http://example.org/publication/0">"#));
        assert!(xml.contains("<dcterms:title>Fish &amp; &lt;Chips&gt;</dcterms:title>"));
        assert!(xml.contains("<bibo:volume>12</bibo:volume>"));
        let document_type = r#"<rdf:type rdf:resource="http://purl.org/ontology/bibo/Document"/>"#;
        assert!(xml.contains(document_type));
        assert!(xml.trim_end().ends_with("</rdf:RDF>"));
        Ok(())
    }

    #[test]
    fn test_export_topic_filters_and_limits() -> Result<()> {
        let dir = TempDir::new()?;
        let path = dir.path().join("publications_COMP.rdf");
        let table = PublicationTable::new(vec![
            row("MATH", "m0"),
            row("COMP", "c1"),
            row("COMP", "c2"),
            row("COMP", "c3"),
        ]);

        let exported = export_topic(&table, "COMP", 2, &path)?;
        assert_eq!(exported, 2);

        let xml = std::fs::read_to_string(&path)?;
        // row indices refer to the full table
        assert!(xml.contains("http://example.org/publication/1"));
        assert!(xml.contains("http://example.org/publication/2"));
        assert!(!xml.contains("http://example.org/publication/0"));
        assert!(!xml.contains("http://example.org/publication/3"));
        Ok(())
    }
}
