use std::io::{BufWriter, Write};

use indexmap::IndexMap;
use itertools::Itertools;
use log::debug;

use crate::crs::EpsgCrs;
use crate::encoder::{EncoderState, EncodingContext, FeatureEncoder, StreamMetadata};
use crate::error::{EncodingError, Result};
use crate::io::gml::coordinates::{CoordinatesFormat, CoordinatesWriter};
use crate::io::gml::feature::{MarkupElement, MarkupNode};
use crate::io::gml::names::{
    escape_attribute, escape_text, Attribute, Namespaces, QName, ATOM_NAMESPACE, WFS_NAMESPACE,
    XSI_NAMESPACE,
};

/// An `atom:link` written before the first member of a collection.
#[derive(Debug, Clone, PartialEq)]
pub struct Link {
    pub rel: String,
    pub href: String,
    pub media_type: Option<String>,
    pub title: Option<String>,
}

impl Link {
    pub fn new(rel: impl Into<String>, href: impl Into<String>) -> Self {
        Self {
            rel: rel.into(),
            href: href.into(),
            media_type: None,
            title: None,
        }
    }

    pub fn with_media_type(mut self, media_type: impl Into<String>) -> Self {
        self.media_type = Some(media_type.into());
        self
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }
}

/// Options for the GML encoder.
#[derive(Debug, Clone)]
pub struct GmlOptions {
    /// Prefixes declared on the document root.
    pub namespaces: Namespaces,

    /// Namespace URI to schema document, written as `xsi:schemaLocation`. Replaces any
    /// schema location found on a feature.
    pub schema_locations: IndexMap<String, String>,

    /// CRS written to `srsName`. Defaults to the target CRS of the context.
    pub output_crs: Option<EpsgCrs>,

    /// Fixed output dimension of coordinate tuples.
    pub target_dimension: Option<usize>,

    /// Wrap features in a collection. Without it the document holds a single feature.
    pub feature_collection: bool,

    pub collection_element: QName,

    pub member_element: QName,

    pub links: Vec<Link>,

    /// Local names of the elements whose text is a coordinate list.
    pub coordinate_elements: Vec<String>,

    /// Number of decimal places of written coordinates.
    pub precision: Option<usize>,
}

impl Default for GmlOptions {
    fn default() -> Self {
        Self {
            namespaces: Namespaces::default(),
            schema_locations: IndexMap::new(),
            output_crs: None,
            target_dimension: None,
            feature_collection: true,
            collection_element: QName::new(WFS_NAMESPACE, "FeatureCollection"),
            member_element: QName::new(WFS_NAMESPACE, "member"),
            links: vec![],
            coordinate_elements: ["posList", "pos", "coordinates", "lowerCorner", "upperCorner"]
                .into_iter()
                .map(String::from)
                .collect(),
            precision: None,
        }
    }
}

#[derive(Debug)]
struct OpenElement {
    qualified: String,
    // prefixes generated for this element: (prefix, uri)
    declarations: Vec<(String, String)>,
    srs_dimension: Option<usize>,
}

fn declarations_string(declarations: &[(String, String)]) -> String {
    declarations
        .iter()
        .map(|(prefix, uri)| format!(" xmlns:{prefix}=\"{}\"", escape_attribute(uri)))
        .join("")
}

/// Streams a GML document.
///
/// Start tags are kept open until the first child or text arrives, so empty elements are
/// written self-closing. Errors are fatal: a document cannot be kept well-formed after a
/// failed write.
pub struct GmlEncoder<'a, W: Write> {
    context: &'a EncodingContext,
    options: GmlOptions,
    writer: BufWriter<W>,
    state: EncoderState,
    in_container_start: bool,
    in_feature_start: bool,
    in_property_start: bool,
    in_property_text: bool,
    in_coordinates: bool,
    links_written: bool,
    container: Option<String>,
    member: Option<String>,
    open: Vec<OpenElement>,
    coordinates: Option<CoordinatesWriter<'a>>,
    generated_prefixes: usize,
    features: u64,
}

impl<'a, W: Write> GmlEncoder<'a, W> {
    pub fn new(context: &'a EncodingContext, writer: W) -> Self {
        Self::with_options(context, writer, Default::default())
    }

    pub fn with_options(context: &'a EncodingContext, writer: W, mut options: GmlOptions) -> Self {
        if !options.links.is_empty() && !options.namespaces.contains(ATOM_NAMESPACE) {
            options.namespaces.insert("atom", ATOM_NAMESPACE);
        }
        Self {
            context,
            options,
            writer: BufWriter::new(writer),
            state: EncoderState::default(),
            in_container_start: false,
            in_feature_start: false,
            in_property_start: false,
            in_property_text: false,
            in_coordinates: false,
            links_written: false,
            container: None,
            member: None,
            open: vec![],
            coordinates: None,
            generated_prefixes: 0,
            features: 0,
        }
    }

    /// Flush and return the underlying writer.
    pub fn into_inner(self) -> Result<W> {
        self.writer
            .into_inner()
            .map_err(|err| EncodingError::IOError(err.into_error()))
    }

    fn output_crs(&self) -> EpsgCrs {
        self.options
            .output_crs
            .unwrap_or_else(|| self.context.target_crs())
    }

    fn output_dimension(&self) -> Option<usize> {
        self.options.target_dimension.or_else(|| {
            self.context
                .crs_transformer()
                .and_then(|t| t.target_dimension())
        })
    }

    fn schema_location(&self) -> Option<String> {
        if self.options.schema_locations.is_empty() {
            return None;
        }
        Some(
            self.options
                .schema_locations
                .iter()
                .map(|(namespace, location)| format!("{namespace} {location}"))
                .join(" "),
        )
    }

    /// Prefixed form of `name`. Namespaces without a registered or inherited prefix get a
    /// generated one, which is added to `declarations`.
    fn qualify(&mut self, name: &QName, declarations: &mut Vec<(String, String)>) -> String {
        let Some(uri) = name.namespace.as_deref() else {
            return name.local_name.clone();
        };
        let known = self.options.namespaces.prefix(uri).map(String::from).or_else(|| {
            declarations
                .iter()
                .chain(self.open.iter().rev().flat_map(|e| e.declarations.iter()))
                .find(|(_, declared)| declared == uri)
                .map(|(prefix, _)| prefix.clone())
        });
        let prefix = match known {
            Some(prefix) => prefix,
            None => {
                self.generated_prefixes += 1;
                let prefix = format!("ns{}", self.generated_prefixes);
                declarations.push((prefix.clone(), uri.to_string()));
                prefix
            }
        };
        format!("{prefix}:{}", name.local_name)
    }

    fn attribute_string(
        &mut self,
        name: &QName,
        value: &str,
        declarations: &mut Vec<(String, String)>,
    ) -> String {
        let name = self.qualify(name, declarations);
        format!(" {name}=\"{}\"", escape_attribute(value))
    }

    fn root_declarations(&self) -> String {
        self.options
            .namespaces
            .iter()
            .map(|(prefix, uri)| format!(" xmlns:{prefix}=\"{}\"", escape_attribute(uri)))
            .join("")
    }

    /// Close a pending feature or property start tag.
    fn close_start_tag(&mut self) -> Result<()> {
        if self.in_feature_start || self.in_property_start {
            self.writer.write_all(b">")?;
            self.in_feature_start = false;
            self.in_property_start = false;
        }
        Ok(())
    }

    /// Close the collection start tag and write the links, once.
    fn open_container_content(&mut self) -> Result<()> {
        if self.in_container_start {
            self.writer.write_all(b">")?;
            self.in_container_start = false;
        }
        if !self.links_written {
            self.links_written = true;
            let links = std::mem::take(&mut self.options.links);
            for link in &links {
                let mut declarations = vec![];
                let name = self.qualify(&QName::new(ATOM_NAMESPACE, "link"), &mut declarations);
                let mut tag = format!("\n<{name}");
                tag.push_str(&format!(" rel=\"{}\"", escape_attribute(&link.rel)));
                tag.push_str(&format!(" href=\"{}\"", escape_attribute(&link.href)));
                if let Some(media_type) = &link.media_type {
                    tag.push_str(&format!(" type=\"{}\"", escape_attribute(media_type)));
                }
                if let Some(title) = &link.title {
                    tag.push_str(&format!(" title=\"{}\"", escape_attribute(title)));
                }
                write!(self.writer, "{tag}{}/>", declarations_string(&declarations))?;
            }
            self.options.links = links;
        }
        Ok(())
    }

    /// Start a feature element with its attributes.
    pub fn on_feature_start(&mut self, name: &QName, attributes: &[Attribute]) -> Result<()> {
        self.state.check_feature()?;
        if !self.open.is_empty() {
            return Err(EncodingError::Markup(
                "feature started inside another feature".to_string(),
            ));
        }

        let is_root = !self.options.feature_collection;
        if is_root {
            if self.features > 0 {
                return Err(EncodingError::Markup(
                    "a document without a feature collection holds a single feature".to_string(),
                ));
            }
        } else {
            self.open_container_content()?;
            let mut declarations = vec![];
            let member_element = self.options.member_element.clone();
            let member = self.qualify(&member_element, &mut declarations);
            write!(
                self.writer,
                "\n<{member}{}>",
                declarations_string(&declarations)
            )?;
            self.member = Some(member);
        }

        let mut declarations = vec![];
        let qualified = self.qualify(name, &mut declarations);
        let mut attrs = String::new();
        let mut has_location = false;
        for attribute in attributes {
            if attribute.name.is(XSI_NAMESPACE, "schemaLocation") {
                has_location = true;
                let location = self
                    .schema_location()
                    .unwrap_or_else(|| attribute.value.clone());
                attrs.push_str(&self.attribute_string(&attribute.name, &location, &mut declarations));
            } else {
                attrs.push_str(&self.attribute_string(
                    &attribute.name,
                    &attribute.value,
                    &mut declarations,
                ));
            }
        }
        if is_root && !has_location {
            if let Some(location) = self.schema_location() {
                let name = QName::new(XSI_NAMESPACE, "schemaLocation");
                attrs.push_str(&self.attribute_string(&name, &location, &mut declarations));
            }
        }

        let root_declarations = if is_root {
            self.root_declarations()
        } else {
            String::new()
        };
        write!(
            self.writer,
            "\n<{qualified}{root_declarations}{}{attrs}",
            declarations_string(&declarations)
        )?;
        self.open.push(OpenElement {
            qualified,
            declarations,
            srs_dimension: None,
        });
        self.in_feature_start = true;
        self.in_property_start = false;
        self.in_property_text = false;
        Ok(())
    }

    /// Start a property element, possibly nested in another property.
    ///
    /// `srsName` is rewritten to the output CRS and `srsDimension` sets the tuple width of the
    /// coordinates below this element.
    pub fn on_property_start(&mut self, name: &QName, attributes: &[Attribute]) -> Result<()> {
        self.state.check_feature()?;
        if self.open.is_empty() {
            return Err(EncodingError::Markup(format!(
                "property {name} outside of a feature"
            )));
        }
        if self.in_coordinates {
            return Err(EncodingError::Markup(format!(
                "element {name} inside a coordinate list"
            )));
        }
        self.close_start_tag()?;

        let mut declarations = vec![];
        let qualified = self.qualify(name, &mut declarations);
        let mut attrs = String::new();
        let mut srs_dimension = None;
        for attribute in attributes {
            let unqualified = attribute.name.namespace.is_none();
            if unqualified && attribute.name.local_name == "srsName" {
                let crs = self.output_crs().to_uri_string();
                attrs.push_str(&self.attribute_string(&attribute.name, &crs, &mut declarations));
            } else if unqualified && attribute.name.local_name == "srsDimension" {
                match attribute.value.trim().parse::<usize>() {
                    Ok(dimension) => srs_dimension = Some(dimension),
                    Err(_) => debug!("ignoring invalid srsDimension '{}'", attribute.value),
                }
                let value = self
                    .options
                    .target_dimension
                    .map_or_else(|| attribute.value.clone(), |d| d.to_string());
                attrs.push_str(&self.attribute_string(&attribute.name, &value, &mut declarations));
            } else {
                attrs.push_str(&self.attribute_string(
                    &attribute.name,
                    &attribute.value,
                    &mut declarations,
                ));
            }
        }

        write!(
            self.writer,
            "\n<{qualified}{}{attrs}",
            declarations_string(&declarations)
        )?;
        let srs_dimension =
            srs_dimension.or_else(|| self.open.iter().rev().find_map(|e| e.srs_dimension));
        self.open.push(OpenElement {
            qualified,
            declarations,
            srs_dimension,
        });
        self.in_property_start = true;
        self.in_property_text = false;

        if self
            .options
            .coordinate_elements
            .iter()
            .any(|local| *local == name.local_name)
        {
            self.in_coordinates = true;
            self.coordinates = Some(CoordinatesWriter::new(
                CoordinatesFormat::for_element(&name.local_name),
                self.context.crs_transformer(),
                srs_dimension.unwrap_or(2),
                self.output_dimension(),
                self.options.precision,
            ));
        }
        Ok(())
    }

    /// Write text content of the current property. May be called repeatedly.
    pub fn on_property_text(&mut self, text: &str) -> Result<()> {
        self.state.check_feature()?;
        if self.open.len() < 2 {
            return Err(EncodingError::Markup(
                "text outside of a property".to_string(),
            ));
        }
        if text.is_empty() {
            return Ok(());
        }
        self.close_start_tag()?;
        if self.in_coordinates {
            let mut out = String::new();
            if let Some(coordinates) = self.coordinates.as_mut() {
                coordinates.write(text, &mut out)?;
            }
            self.writer.write_all(out.as_bytes())?;
        } else {
            self.writer.write_all(escape_text(text).as_bytes())?;
        }
        self.in_property_text = true;
        Ok(())
    }

    /// End the current property. A property without content is written self-closing.
    pub fn on_property_end(&mut self) -> Result<()> {
        self.state.check_feature()?;
        if self.open.len() < 2 {
            return Err(EncodingError::Markup("no open property to end".to_string()));
        }
        if self.in_coordinates {
            let mut out = String::new();
            if let Some(mut coordinates) = self.coordinates.take() {
                coordinates.finish(&mut out)?;
            }
            if !out.is_empty() {
                self.close_start_tag()?;
                self.writer.write_all(out.as_bytes())?;
                self.in_property_text = true;
            }
            self.in_coordinates = false;
        }

        let element = self
            .open
            .pop()
            .ok_or_else(|| EncodingError::Markup("no open property to end".to_string()))?;
        if self.in_property_start {
            self.writer.write_all(b"/>")?;
        } else if self.in_property_text {
            write!(self.writer, "</{}>", element.qualified)?;
        } else {
            write!(self.writer, "\n</{}>", element.qualified)?;
        }
        self.in_property_start = false;
        self.in_property_text = false;
        Ok(())
    }

    /// End the current feature.
    pub fn on_feature_end(&mut self) -> Result<()> {
        self.state.check_feature()?;
        if self.open.len() != 1 {
            return Err(EncodingError::Markup(match self.open.len() {
                0 => "no open feature to end".to_string(),
                n => format!("feature ended with {} open properties", n - 1),
            }));
        }
        let element = self
            .open
            .pop()
            .ok_or_else(|| EncodingError::Markup("no open feature to end".to_string()))?;
        if self.in_feature_start {
            self.writer.write_all(b"/>")?;
        } else {
            write!(self.writer, "\n</{}>", element.qualified)?;
        }
        self.in_feature_start = false;
        self.in_property_text = false;
        if let Some(member) = self.member.take() {
            write!(self.writer, "\n</{member}>")?;
        }
        self.features += 1;
        Ok(())
    }

    fn write_node(&mut self, node: &MarkupNode) -> Result<()> {
        match node {
            MarkupNode::Element(element) => {
                self.on_property_start(&element.name, &element.attributes)?;
                for child in &element.children {
                    self.write_node(child)?;
                }
                self.on_property_end()
            }
            MarkupNode::Text(text) => self.on_property_text(text),
        }
    }
}

impl<W: Write> FeatureEncoder for GmlEncoder<'_, W> {
    type Feature = MarkupElement;

    fn on_start(&mut self, metadata: &StreamMetadata) -> Result<()> {
        self.state.start()?;
        self.writer
            .write_all(br#"<?xml version="1.0" encoding="UTF-8"?>"#)?;
        if !self.options.feature_collection {
            return Ok(());
        }

        let mut declarations = vec![];
        let collection_element = self.options.collection_element.clone();
        let container = self.qualify(&collection_element, &mut declarations);
        let mut attrs = String::new();
        if let Some(location) = self.schema_location() {
            let name = QName::new(XSI_NAMESPACE, "schemaLocation");
            attrs.push_str(&self.attribute_string(&name, &location, &mut declarations));
        }
        if let Some(matched) = metadata.number_matched {
            attrs.push_str(&format!(" numberMatched=\"{matched}\""));
        }
        if let Some(returned) = metadata.number_returned {
            attrs.push_str(&format!(" numberReturned=\"{returned}\""));
        }
        if let Some(timestamp) = metadata.timestamp {
            attrs.push_str(&format!(
                " timeStamp=\"{}\"",
                timestamp.to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
            ));
        }
        write!(
            self.writer,
            "\n<{container}{}{}{attrs}",
            self.root_declarations(),
            declarations_string(&declarations)
        )?;
        self.container = Some(container);
        self.in_container_start = true;
        Ok(())
    }

    fn on_feature(&mut self, feature: &MarkupElement) -> Result<()> {
        self.on_feature_start(&feature.name, &feature.attributes)?;
        for child in &feature.children {
            self.write_node(child)?;
        }
        self.on_feature_end()
    }

    fn on_end(&mut self, _metadata: &StreamMetadata) -> Result<()> {
        self.state.end()?;
        if !self.open.is_empty() {
            return Err(EncodingError::Markup(
                "document ended inside a feature".to_string(),
            ));
        }
        if !self.options.feature_collection && self.features == 0 {
            return Err(EncodingError::Markup(
                "a document without a feature collection needs exactly one feature".to_string(),
            ));
        }
        if let Some(container) = self.container.take() {
            self.open_container_content()?;
            write!(self.writer, "\n</{container}>")?;
        }
        self.writer.write_all(b"\n")?;
        self.writer.flush()?;
        debug!(
            "finished GML stream for '{}' with {} features",
            self.context.collection_id(),
            self.features
        );
        Ok(())
    }
}
