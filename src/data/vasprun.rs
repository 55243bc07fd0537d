use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use quick_xml::events::Event;
use quick_xml::Reader;

use super::normalize::{EigenArray, ProjectionArray};
use crate::error::{EngineError, Result};

/// The two raw arrays extracted from a calculation.
#[derive(Debug, Clone, PartialEq)]
pub struct RawArrays {
    pub eigenvalues: EigenArray,
    pub projections: ProjectionArray,
}

type EigenSlabs = Vec<Vec<Vec<(f64, f64)>>>;
type ProjectionSlabs = Vec<Vec<Vec<Vec<Vec<f64>>>>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Tag {
    Eigenvalues,
    Projected,
    Array,
    Set,
    Row,
    Other,
}

/// Streaming state for one pass over a vasprun.xml document.
///
/// Only the last `<eigenvalues>` block outside `<projected>` and the last
/// `<projected>` array are kept, so relaxation runs report the final ionic step.
#[derive(Default)]
struct Extractor {
    stack: Vec<Tag>,
    eigen: EigenSlabs,
    projections: ProjectionSlabs,
    last_eigen: Option<EigenSlabs>,
    last_projections: Option<ProjectionSlabs>,
    row: String,
}

impl Extractor {
    fn inside(&self, tag: Tag) -> bool {
        self.stack.contains(&tag)
    }

    fn set_depth(&self) -> usize {
        self.stack.iter().filter(|t| **t == Tag::Set).count()
    }

    fn in_eigen_block(&self) -> bool {
        self.inside(Tag::Eigenvalues) && !self.inside(Tag::Projected)
    }

    fn in_projection_block(&self) -> bool {
        self.inside(Tag::Projected) && self.inside(Tag::Array) && !self.inside(Tag::Eigenvalues)
    }

    fn open(&mut self, name: &[u8]) {
        let tag = match name {
            b"eigenvalues" => {
                if !self.inside(Tag::Projected) {
                    self.eigen.clear();
                }
                Tag::Eigenvalues
            }
            b"projected" => {
                self.projections.clear();
                Tag::Projected
            }
            b"array" => Tag::Array,
            b"set" => Tag::Set,
            b"r" => {
                self.row.clear();
                Tag::Row
            }
            _ => Tag::Other,
        };
        self.stack.push(tag);

        if tag != Tag::Set {
            return;
        }
        // The outermost <set> wraps everything; spin, kpoint and band follow.
        let depth = self.set_depth();
        if self.in_eigen_block() {
            match depth {
                2 => self.eigen.push(Vec::new()),
                3 => {
                    if let Some(spin) = self.eigen.last_mut() {
                        spin.push(Vec::new());
                    }
                }
                _ => {}
            }
        } else if self.in_projection_block() {
            match depth {
                2 => self.projections.push(Vec::new()),
                3 => {
                    if let Some(spin) = self.projections.last_mut() {
                        spin.push(Vec::new());
                    }
                }
                4 => {
                    if let Some(kpoint) = self.projections.last_mut().and_then(|s| s.last_mut()) {
                        kpoint.push(Vec::new());
                    }
                }
                _ => {}
            }
        }
    }

    fn text(&mut self, text: &str) {
        if self.stack.last() == Some(&Tag::Row) {
            self.row.push_str(text);
            self.row.push(' ');
        }
    }

    /// Returns an error message when a row cannot be placed.
    fn close(&mut self) -> std::result::Result<(), String> {
        let Some(tag) = self.stack.pop() else {
            return Ok(());
        };
        match tag {
            Tag::Row => self.finish_row(),
            Tag::Eigenvalues if !self.inside(Tag::Projected) => {
                self.last_eigen = Some(std::mem::take(&mut self.eigen));
                Ok(())
            }
            Tag::Projected => {
                self.last_projections = Some(std::mem::take(&mut self.projections));
                Ok(())
            }
            _ => Ok(()),
        }
    }

    fn finish_row(&mut self) -> std::result::Result<(), String> {
        let in_eigen = self.in_eigen_block();
        let in_projection = self.in_projection_block();
        if !in_eigen && !in_projection {
            return Ok(());
        }

        let values = self
            .row
            .split_whitespace()
            .map(|tok| tok.parse::<f64>().map_err(|_| format!("'{tok}' is not a number")))
            .collect::<std::result::Result<Vec<f64>, String>>()?;

        let depth = self.set_depth();
        if in_eigen {
            if depth != 3 || values.len() < 2 {
                return Err(format!(
                    "eigenvalue row with {} values at set depth {depth}",
                    values.len()
                ));
            }
            let kpoint = self
                .eigen
                .last_mut()
                .and_then(|s| s.last_mut())
                .ok_or("eigenvalue row outside a kpoint set")?;
            kpoint.push((values[0], values[1]));
        } else {
            if depth != 4 {
                return Err(format!("projection row at set depth {depth}"));
            }
            let band = self
                .projections
                .last_mut()
                .and_then(|s| s.last_mut())
                .and_then(|k| k.last_mut())
                .ok_or("projection row outside a band set")?;
            band.push(values);
        }
        Ok(())
    }
}

/// Read eigenvalues and projections from a vasprun.xml file.
pub fn read_vasprun(path: &Path) -> Result<RawArrays> {
    let file = File::open(path)?;
    parse_vasprun(BufReader::new(file), path)
}

/// Parse vasprun.xml content; `path` is only used in error reports.
pub fn parse_vasprun<R: BufRead>(source: R, path: &Path) -> Result<RawArrays> {
    let mut reader = Reader::from_reader(source);
    reader.trim_text(true);
    let mut buf = Vec::new();
    let mut state = Extractor::default();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => state.open(e.name().as_ref()),
            Ok(Event::Text(e)) => {
                let text = e
                    .unescape()
                    .map_err(|err| EngineError::raw_parse(path, reader.buffer_position(), err.to_string()))?;
                state.text(&text);
            }
            Ok(Event::End(_)) => state
                .close()
                .map_err(|msg| EngineError::raw_parse(path, reader.buffer_position(), msg))?,
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(EngineError::raw_parse(
                    path,
                    reader.buffer_position(),
                    format!("XML parse error: {e}"),
                ))
            }
            _ => {}
        }
        buf.clear();
    }

    let position = reader.buffer_position();
    let eigen = state
        .last_eigen
        .ok_or_else(|| EngineError::raw_parse(path, position, "no <eigenvalues> block"))?;
    let projections = state.last_projections.ok_or_else(|| {
        EngineError::raw_parse(
            path,
            position,
            "no <projected> block; the calculation must be run with LORBIT set",
        )
    })?;
    log::info!(
        "Read {} spin channel(s) of eigenvalues and projections from {}",
        eigen.len(),
        path.display()
    );

    Ok(RawArrays {
        eigenvalues: EigenArray::from_nested(eigen)?,
        projections: ProjectionArray::from_nested(projections)?,
    })
}
