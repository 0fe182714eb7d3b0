use fxhash::FxHashMap;
use std::fmt::Write;
use std::path::Path;

use super::error::SteeringError;
use super::path::ProcessingPath;
use super::processor::Processor;

// Layout of a Marlin steering file
// marlin
// |---- execute - processor refs in execution order
// |---- global - GearXMLFile, MaxRecordNumber, LCIOInputFiles, Verbosity, ...
// |---- processor(name, type) - one definition per distinct processor name
// |    |---- parameter(name, value)

/// Escape the XML special characters in attribute and text content
fn escape(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

/// Collect the distinct processor definitions of a path, keeping first-use order.
///
/// A processor may be executed more than once in a path, but a name must always refer to
/// the same configuration.
fn distinct_processors(path: &ProcessingPath) -> Result<Vec<&Processor>, SteeringError> {
    let mut seen: FxHashMap<&str, &Processor> = FxHashMap::default();
    let mut ordered: Vec<&Processor> = Vec::new();
    for processor in path.processors() {
        match seen.get(processor.name.as_str()) {
            Some(previous) => {
                if *previous != processor {
                    return Err(SteeringError::ConflictingProcessor {
                        path: path.name.clone(),
                        name: processor.name.clone(),
                    });
                }
            }
            None => {
                seen.insert(processor.name.as_str(), processor);
                ordered.push(processor);
            }
        }
    }
    Ok(ordered)
}

/// Render a path into a Marlin XML steering document
pub fn render_steering(path: &ProcessingPath) -> Result<String, SteeringError> {
    if path.processors().is_empty() {
        return Err(SteeringError::EmptyPath(path.name.clone()));
    }
    let definitions = distinct_processors(path)?;

    let mut xml = String::new();
    writeln!(xml, "<?xml version=\"1.0\" encoding=\"us-ascii\"?>")?;
    writeln!(xml, "<!-- steering for path {} -->", escape(&path.name))?;
    writeln!(
        xml,
        "<marlin xmlns:xsi=\"http://www.w3.org/2001/XMLSchema-instance\" xsi:noNamespaceSchemaLocation=\"http://ilcsoft.desy.de/marlin/marlin.xsd\">"
    )?;

    writeln!(xml, "  <execute>")?;
    for processor in path.processors() {
        writeln!(xml, "    <processor name=\"{}\"/>", escape(&processor.name))?;
    }
    writeln!(xml, "  </execute>")?;

    let globals = &path.globals;
    writeln!(xml, "  <global>")?;
    if !globals.lcio_input_files.is_empty() {
        writeln!(
            xml,
            "    <parameter name=\"LCIOInputFiles\"> {} </parameter>",
            escape(&globals.lcio_input_files.join(" "))
        )?;
    }
    writeln!(
        xml,
        "    <parameter name=\"GearXMLFile\" value=\"{}\"/>",
        escape(&globals.gear_file.to_string_lossy())
    )?;
    writeln!(
        xml,
        "    <parameter name=\"MaxRecordNumber\" value=\"{}\"/>",
        globals.max_record_number
    )?;
    writeln!(xml, "    <parameter name=\"SkipNEvents\" value=\"0\"/>")?;
    writeln!(xml, "    <parameter name=\"SupressCheck\" value=\"false\"/>")?;
    if let Some(verbosity) = &globals.verbosity {
        writeln!(
            xml,
            "    <parameter name=\"Verbosity\" options=\"DEBUG0-4,MESSAGE0-4,WARNING0-4,ERROR0-4,SILENT\"> {} </parameter>",
            escape(verbosity)
        )?;
    }
    writeln!(xml, "  </global>")?;

    for processor in definitions {
        writeln!(
            xml,
            "  <processor name=\"{}\" type=\"{}\">",
            escape(&processor.name),
            processor.proc_type()
        )?;
        for param in processor.parameters() {
            writeln!(
                xml,
                "    <parameter name=\"{}\" value=\"{}\"/>",
                param.name,
                escape(&param.value.to_string())
            )?;
        }
        writeln!(xml, "  </processor>")?;
    }
    writeln!(xml, "</marlin>")?;

    Ok(xml)
}

/// Render a path and write it to the given file
pub fn write_steering_file(path: &ProcessingPath, dest: &Path) -> Result<(), SteeringError> {
    let xml = render_steering(path)?;
    std::fs::write(dest, xml)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::path::PathGlobals;
    use crate::processor::{ProcessorConfig, TrackFitDqm};
    use std::path::PathBuf;

    fn dqm(root_file: &str) -> Processor {
        Processor::new(
            "TelescopeDQM",
            ProcessorConfig::TrackFitDqm(TrackFitDqm {
                root_file: root_file.to_string(),
            }),
        )
    }

    fn globals() -> PathGlobals {
        PathGlobals {
            gear_file: PathBuf::from("geoid1.xml"),
            max_record_number: 200_000,
            verbosity: None,
            lcio_input_files: vec![String::from("tmp.slcio")],
        }
    }

    #[test]
    fn test_render_path() {
        let mut path = ProcessingPath::new("dqm_path", globals());
        path.add_processor(dqm("TelescopeDQM.root"));
        path.add_processor(dqm("TelescopeDQM.root"));
        let xml = render_steering(&path).unwrap();

        assert_eq!(xml.matches("<processor name=\"TelescopeDQM\"/>").count(), 2);
        assert_eq!(
            xml.matches("<processor name=\"TelescopeDQM\" type=\"TrackFitDQM\">")
                .count(),
            1
        );
        assert!(xml.contains("<parameter name=\"LCIOInputFiles\"> tmp.slcio </parameter>"));
        assert!(xml.contains("<parameter name=\"MaxRecordNumber\" value=\"200000\"/>"));
        assert!(xml.contains("<parameter name=\"RootFileName\" value=\"TelescopeDQM.root\"/>"));
        assert!(!xml.contains("Verbosity"));
    }

    #[test]
    fn test_conflicting_processor_names() {
        let mut path = ProcessingPath::new("dqm_path", globals());
        path.add_processor(dqm("a.root"));
        path.add_processor(dqm("b.root"));
        assert!(matches!(
            render_steering(&path),
            Err(SteeringError::ConflictingProcessor { .. })
        ));
    }

    #[test]
    fn test_empty_path_and_escaping() {
        let path = ProcessingPath::new("empty", globals());
        assert!(matches!(
            render_steering(&path),
            Err(SteeringError::EmptyPath(_))
        ));
        assert_eq!(escape("a<b && \"c\""), "a&lt;b &amp;&amp; &quot;c&quot;");
    }
}
