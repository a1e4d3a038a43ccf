use std::collections::BTreeMap;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Author {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Year")]
    pub year: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Book {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Authors")]
    pub authors: Vec<Author>,
    #[serde(rename = "published")]
    pub year: i32,
    #[serde(rename = "Read")]
    pub read: bool,
    #[serde(rename = "Comments", default, skip_serializing_if = "BTreeMap::is_empty")]
    pub comments: BTreeMap<String, String>,
}

fn author(name: &str, year: i32) -> Author {
    Author {
        name: name.to_string(),
        year,
    }
}

pub fn library() -> Vec<Book> {
    let trio = || {
        vec![
            author("Frank", 400),
            author("Lisy", 2000),
            author("Aimee", 1000),
        ]
    };

    vec![
        Book {
            name: "Mama Pijama".to_string(),
            authors: vec![author("Frank Galagher", 500)],
            year: 1900,
            read: true,
            comments: [("Vova", "Cool book"), ("Sasha", "Awful")]
                .into_iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        },
        Book {
            name: "FlowerGirl".to_string(),
            authors: trio(),
            year: 2000,
            read: true,
            comments: BTreeMap::new(),
        },
        Book {
            name: "FlowerBoy".to_string(),
            authors: trio(),
            year: 2000,
            read: true,
            comments: BTreeMap::new(),
        },
    ]
}

/// The XML rendition of the library: authors carry `born` instead of
/// `Year`, and comments are left out.
#[derive(Serialize)]
#[serde(rename = "myshelf")]
struct XmlShelf<'a> {
    #[serde(rename = "item")]
    items: Vec<XmlBook<'a>>,
}

#[derive(Serialize)]
struct XmlBook<'a> {
    #[serde(rename = "Name")]
    name: &'a str,
    #[serde(rename = "Authors")]
    authors: Vec<XmlAuthor<'a>>,
    #[serde(rename = "Year")]
    year: i32,
    #[serde(rename = "Read")]
    read: bool,
}

#[derive(Serialize)]
struct XmlAuthor<'a> {
    #[serde(rename = "Name")]
    name: &'a str,
    #[serde(rename = "born")]
    year: i32,
}

impl<'a> From<&'a [Book]> for XmlShelf<'a> {
    fn from(books: &'a [Book]) -> Self {
        let items = books
            .iter()
            .map(|book| XmlBook {
                name: &book.name,
                authors: book
                    .authors
                    .iter()
                    .map(|author| XmlAuthor {
                        name: &author.name,
                        year: author.year,
                    })
                    .collect(),
                year: book.year,
                read: book.read,
            })
            .collect();

        Self { items }
    }
}

fn render_xml(books: &[Book]) -> anyhow::Result<String> {
    let mut xml = String::new();

    let mut ser = quick_xml::se::Serializer::new(&mut xml);
    ser.indent(' ', 3);
    XmlShelf::from(books).serialize(ser)?;

    Ok(xml)
}

/// Fixed documents served verbatim, serialized once at startup.
#[derive(Debug, Clone)]
pub struct SampleDocuments {
    json: Bytes,
    xml: Bytes,
}

impl SampleDocuments {
    pub fn build() -> anyhow::Result<Self> {
        let books = library();
        let json = serde_json::to_vec_pretty(&books)?;
        let xml = render_xml(&books)?;

        Ok(Self {
            json: Bytes::from(json),
            xml: Bytes::from(xml),
        })
    }

    #[inline]
    pub fn json(&self) -> Bytes {
        self.json.clone()
    }

    #[inline]
    pub fn xml(&self) -> Bytes {
        self.xml.clone()
    }
}
