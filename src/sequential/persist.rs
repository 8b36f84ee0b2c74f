//! Plaintext network description files.
//!
//! ```text
//! # comments and blank lines are ignored
//! CAMADA <layer> <width>                      one per layer, any order
//! TIPO_SAIDA <SCE|LMSE>                       output strategy tag
//! BIAS <layer> <b0> <b1> ... <bn-1>           layer in 1..L-1
//! LIGACAO <from_layer> <from_neuron> <to_layer> <to_neuron> <weight>
//! ```
//!
//! Loading takes two passes. The first one collects `CAMADA` and `TIPO_SAIDA` records and
//! allocates a zeroed network; the second one fills in `BIAS` and `LIGACAO` records,
//! checking each of them against the topology. Connections that are not listed stay at
//! zero. Values are written with the shortest representation that parses back to the same
//! `f64`, so a save/load round trip is exact.

use std::{
    fs,
    io::{self, BufWriter, Write},
    path::Path,
    str::{FromStr, SplitWhitespace},
};

use tracing::{debug, warn};

use super::activation::Activation;
use super::net::{NewNetError, Network};
use super::output::{OutputLayer, OutputStrategy};

const LAYER: &str = "CAMADA";
const OUTPUT_TYPE: &str = "TIPO_SAIDA";
const BIAS: &str = "BIAS";
const CONNECTION: &str = "LIGACAO";

impl Network {
    /// Writes the network description to a file, replacing its contents.
    ///
    /// # Examples
    /// ```
    /// # use seqnet::sequential::Network;
    /// let net = Network::from_tag(&[2, 2, 2], "SCE").unwrap();
    /// let file = tempfile::NamedTempFile::new().unwrap();
    /// net.save(file.path()).unwrap();
    ///
    /// let loaded = Network::load(file.path()).unwrap();
    /// assert_eq!(loaded.topology(), net.topology());
    /// assert_eq!(loaded.weights(1).unwrap(), net.weights(1).unwrap());
    /// ```
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), SaveError> {
        let path = path.as_ref();
        let mut writer = BufWriter::new(fs::File::create(path)?);
        self.write_description(&mut writer)?;
        writer.flush()?;
        debug!(path = %path.display(), topology = ?self.topology, "network saved");
        Ok(())
    }

    /// Writes the network description to `writer`.
    pub fn write_description<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        writeln!(writer, "#######################################")?;
        writeln!(writer, "#  NEURAL NETWORK DESCRIPTION FILE    #")?;
        writeln!(writer, "#  >>> SEQUENTIAL NETWORK <<<         #")?;
        writeln!(writer, "#######################################")?;
        writeln!(writer)?;

        writeln!(writer, "# Topology")?;
        writeln!(writer, "# {} layer_index width", LAYER)?;
        for (i, width) in self.topology.iter().enumerate() {
            writeln!(writer, "{} {} {}", LAYER, i, width)?;
        }
        writeln!(writer)?;

        writeln!(writer, "# Output layer")?;
        writeln!(writer, "# {} tag", OUTPUT_TYPE)?;
        writeln!(writer, "{} {}", OUTPUT_TYPE, self.output.type_tag())?;
        writeln!(writer)?;

        writeln!(writer, "# Biases")?;
        writeln!(writer, "# {} layer_index bias_0 bias_1 ... bias_n-1", BIAS)?;
        for (i, layer) in self.layers.iter().enumerate() {
            write!(writer, "{} {}", BIAS, i + 1)?;
            for bias in layer.biases.iter() {
                write!(writer, " {}", bias)?;
            }
            writeln!(writer)?;
        }
        writeln!(writer)?;

        writeln!(writer, "# Connections")?;
        writeln!(
            writer,
            "# {} from_layer from_neuron to_layer to_neuron weight",
            CONNECTION
        )?;
        for (i, layer) in self.layers.iter().enumerate() {
            writeln!(writer)?;
            writeln!(writer, "# From layer {} to layer {}", i, i + 1)?;
            for from in 0..layer.weights.rows() {
                for (to, weight) in layer.weights.row(from).iter().enumerate() {
                    writeln!(writer, "{} {} {} {} {} {}", CONNECTION, i, from, i + 1, to, weight)?;
                }
            }
        }
        Ok(())
    }

    /// Description text of the network, as written by `Network::save`.
    pub fn to_description(&self) -> String {
        let mut buffer = Vec::new();
        // Writing into a Vec cannot fail
        let _ = self.write_description(&mut buffer);
        String::from_utf8_lossy(&buffer).into_owned()
    }

    /// Reads a network from a description file, with ReLU hidden layers.
    ///
    /// # Returns
    /// * `Ok(Network)` if the file exists and every record is well-formed and in range;
    /// * `Err(LoadError)` otherwise.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Network, LoadError> {
        Network::load_with_activation(path, Activation::default())
    }

    /// Reads a network from a description file. The hidden activation is not part of the
    /// file, so it is given here.
    pub fn load_with_activation<P: AsRef<Path>>(
        path: P,
        hidden: Activation,
    ) -> Result<Network, LoadError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(LoadError::Io)?;
        let net = Network::from_description(&text, hidden).map_err(|err| {
            warn!(path = %path.display(), error = %err, "network description rejected");
            err
        })?;
        debug!(path = %path.display(), topology = ?net.topology, "network loaded");
        Ok(net)
    }

    /// Parses a network description.
    ///
    /// # Examples
    /// ```
    /// # use seqnet::sequential::{Activation, Network};
    /// let text = "
    /// # layers may come in any order
    /// CAMADA 1 1
    /// CAMADA 0 2
    /// TIPO_SAIDA LMSE
    /// BIAS 1 0.5
    /// LIGACAO 0 0 1 0 2
    /// LIGACAO 0 1 1 0 -1
    /// ";
    /// let net = Network::from_description(text, Activation::ReLU).unwrap();
    /// assert_eq!(net.topology(), &[2, 1]);
    /// assert_eq!(net.predict(&[1.0, 1.0]), vec![1.5]);
    ///
    /// let bad = "CAMADA 0 2\nCAMADA 1 1\nLIGACAO 0 0 0 0 1.0\n";
    /// assert!(Network::from_description(bad, Activation::ReLU).is_err());
    /// ```
    pub fn from_description(text: &str, hidden: Activation) -> Result<Network, LoadError> {
        // Pass 1: topology and output strategy
        let mut declared: Vec<(usize, usize)> = Vec::new();
        let mut output = OutputLayer::default();
        for (line, mut fields) in records(text) {
            match fields.next() {
                Some(LAYER) => {
                    let index: usize = field(&mut fields, line, "layer index")?;
                    let width: usize = field(&mut fields, line, "layer width")?;
                    if declared.iter().any(|&(i, _)| i == index) {
                        return Err(LoadError::DuplicateLayer { line, index });
                    }
                    declared.push((index, width));
                }
                Some(OUTPUT_TYPE) => {
                    let tag = fields.next().ok_or(LoadError::Malformed {
                        line,
                        what: "output type",
                    })?;
                    output = OutputLayer::from_tag(tag);
                }
                _ => {}
            }
        }

        declared.sort_by_key(|&(index, _)| index);
        let topology: Vec<usize> = declared.iter().map(|&(_, width)| width).collect();
        let mut net = Network::zeroed(&topology, output, hidden).map_err(|err| match err {
            NewNetError::BadTopology(count) => LoadError::TooFewLayers(count),
            NewNetError::EmptyLayer(position) => LoadError::EmptyLayer(declared[position].0),
            NewNetError::TooLarge { index, .. } => LoadError::TooLarge(declared[index].0),
        })?;

        // Pass 2: parameters, checked against the topology
        let layers = topology.len();
        for (line, mut fields) in records(text) {
            match fields.next() {
                Some(BIAS) => {
                    let layer: usize = field(&mut fields, line, "bias layer")?;
                    if layer < 1 || layer >= layers {
                        return Err(LoadError::BiasLayerOutOfRange { line, layer });
                    }
                    for bias in net.layers[layer - 1].biases.iter_mut() {
                        *bias = field(&mut fields, line, "bias value")?;
                    }
                }
                Some(CONNECTION) => {
                    let from_layer: usize = field(&mut fields, line, "source layer")?;
                    let from: usize = field(&mut fields, line, "source neuron")?;
                    let to_layer: usize = field(&mut fields, line, "destination layer")?;
                    let to: usize = field(&mut fields, line, "destination neuron")?;
                    let weight: f64 = field(&mut fields, line, "weight")?;

                    if from_layer.checked_add(1) != Some(to_layer) {
                        return Err(LoadError::NotAdjacent {
                            line,
                            from_layer,
                            to_layer,
                        });
                    }
                    if to_layer >= layers || from >= topology[from_layer] || to >= topology[to_layer] {
                        return Err(LoadError::ConnectionOutOfRange { line });
                    }
                    net.layers[from_layer].weights.set(from, to, weight);
                }
                _ => {}
            }
        }

        Ok(net)
    }
}

/// Meaningful lines: `(line number, whitespace-separated fields)`, skipping comments and
/// blank lines.
fn records(text: &str) -> impl Iterator<Item = (usize, SplitWhitespace<'_>)> {
    text.lines().enumerate().filter_map(|(i, line)| {
        let line = line.trim_start();
        if line.is_empty() || line.starts_with('#') {
            None
        } else {
            Some((i + 1, line.split_whitespace()))
        }
    })
}

fn field<T: FromStr>(
    fields: &mut SplitWhitespace<'_>,
    line: usize,
    what: &'static str,
) -> Result<T, LoadError> {
    fields
        .next()
        .and_then(|f| f.parse().ok())
        .ok_or(LoadError::Malformed { line, what })
}

/// Error structure for `Network::save`
#[derive(Debug, thiserror::Error)]
pub enum SaveError {
    #[error("Could not write network description: {0}")]
    Io(#[from] io::Error),
}

/// Error structure for `Network::load` and `Network::from_description`
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("Could not read network description: {0}")]
    Io(#[source] io::Error),
    #[error("Net must have at least two layers (input and output), but {0} declared!")]
    TooFewLayers(usize),
    #[error("Layer {0} is declared with no neurons!")]
    EmptyLayer(usize),
    #[error("Layer {0} and the next one are too large to connect!")]
    TooLarge(usize),
    #[error("Line {line}: layer {index} is declared twice!")]
    DuplicateLayer { line: usize, index: usize },
    #[error("Line {line}: missing or invalid {what}!")]
    Malformed { line: usize, what: &'static str },
    #[error("Line {line}: biases of layer {layer} do not exist!")]
    BiasLayerOutOfRange { line: usize, layer: usize },
    #[error("Line {line}: connection from layer {from_layer} to layer {to_layer}, but layers must be adjacent!")]
    NotAdjacent {
        line: usize,
        from_layer: usize,
        to_layer: usize,
    },
    #[error("Line {line}: connection refers to a neuron or layer that does not exist!")]
    ConnectionOutOfRange { line: usize },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(text: &str) -> Result<Network, LoadError> {
        Network::from_description(text, Activation::ReLU)
    }

    #[test]
    fn round_trip_is_exact() {
        let mut net = Network::from_tag(&[3, 4, 2], "SCE").unwrap();
        net.set_biases(0, &[0.1, -1e-300, 3.5e12, -0.0]).unwrap();
        net.set_biases(1, &[std::f64::consts::PI, -std::f64::consts::E]).unwrap();

        let text = net.to_description();
        let loaded = parse(&text).unwrap();
        assert_eq!(loaded.topology(), net.topology());
        assert_eq!(loaded.output_layer(), OutputLayer::SoftmaxCrossEntropy);
        assert_eq!(loaded.layers, net.layers);
        assert_eq!(loaded.to_description(), text);
    }

    #[test]
    fn missing_connections_stay_zero() {
        let net = parse("CAMADA 0 2\nCAMADA 1 2\nLIGACAO 0 1 1 0 4.5\n").unwrap();
        assert_eq!(net.weights(0).unwrap().to_rows(), vec![vec![0.0, 0.0], vec![4.5, 0.0]]);
        assert_eq!(net.biases(0).unwrap(), &[0.0, 0.0]);
        assert_eq!(net.output_layer(), OutputLayer::LinearMse);
    }

    #[test]
    fn unknown_output_tag_is_linear() {
        let net = parse("CAMADA 0 1\nCAMADA 1 1\nTIPO_SAIDA XYZ\n").unwrap();
        assert_eq!(net.output_layer(), OutputLayer::LinearMse);
        let net = parse("TIPO_SAIDA SCE\nCAMADA 0 1\nCAMADA 1 1\n").unwrap();
        assert_eq!(net.output_layer(), OutputLayer::SoftmaxCrossEntropy);
    }

    #[test]
    fn layers_are_sorted_by_index() {
        let net = parse("CAMADA 2 1\n  # indented comment\n\nCAMADA 0 3\nCAMADA 1 5\n").unwrap();
        assert_eq!(net.topology(), &[3, 5, 1]);
    }

    #[test]
    fn rejects_structural_errors() {
        let base = "CAMADA 0 2\nCAMADA 1 3\nCAMADA 2 1\n";
        let with = |record: &str| parse(&format!("{}{}\n", base, record));

        assert!(matches!(parse("CAMADA 0 2\n"), Err(LoadError::TooFewLayers(1))));
        assert!(matches!(parse(""), Err(LoadError::TooFewLayers(0))));
        assert!(matches!(
            parse("CAMADA 0 2\nCAMADA 1 0\n"),
            Err(LoadError::EmptyLayer(1))
        ));
        assert!(matches!(
            parse("CAMADA 0 2\nCAMADA 0 3\nCAMADA 1 1\n"),
            Err(LoadError::DuplicateLayer { line: 2, index: 0 })
        ));
        assert!(matches!(
            with("BIAS 0 1.0 2.0"),
            Err(LoadError::BiasLayerOutOfRange { layer: 0, .. })
        ));
        assert!(matches!(
            with("BIAS 3 1.0"),
            Err(LoadError::BiasLayerOutOfRange { layer: 3, .. })
        ));
        assert!(matches!(
            with("BIAS 1 1.0 2.0"),
            Err(LoadError::Malformed { line: 4, .. })
        ));
        assert!(matches!(
            with("LIGACAO 0 0 2 0 1.0"),
            Err(LoadError::NotAdjacent { from_layer: 0, to_layer: 2, .. })
        ));
        assert!(matches!(
            with("LIGACAO 1 0 1 0 1.0"),
            Err(LoadError::NotAdjacent { .. })
        ));
        assert!(matches!(
            with("LIGACAO 2 0 3 0 1.0"),
            Err(LoadError::ConnectionOutOfRange { .. })
        ));
        assert!(matches!(
            with("LIGACAO 0 2 1 0 1.0"),
            Err(LoadError::ConnectionOutOfRange { .. })
        ));
        assert!(matches!(
            with("LIGACAO 1 0 2 1 1.0"),
            Err(LoadError::ConnectionOutOfRange { .. })
        ));
        assert!(matches!(
            with("LIGACAO 18446744073709551615 0 0 0 1.0"),
            Err(LoadError::NotAdjacent { to_layer: 0, .. })
        ));
        assert!(matches!(
            with("LIGACAO 18446744073709551614 0 18446744073709551615 0 1.0"),
            Err(LoadError::ConnectionOutOfRange { .. })
        ));
        assert!(matches!(
            parse("CAMADA 0 4294967296\nCAMADA 1 4294967296\n"),
            Err(LoadError::TooLarge(0))
        ));
        assert!(matches!(
            with("LIGACAO 0 0 1 0 heavy"),
            Err(LoadError::Malformed { what: "weight", .. })
        ));
        assert!(matches!(
            parse("CAMADA zero 2\nCAMADA 1 1\n"),
            Err(LoadError::Malformed { line: 1, .. })
        ));
    }

    #[test]
    fn every_non_adjacent_connection_fails() {
        let base = "CAMADA 0 2\nCAMADA 1 2\nCAMADA 2 2\nCAMADA 3 2\n";
        for from in 0..4 {
            for to in 0..5 {
                let text = format!("{}LIGACAO {} 0 {} 0 1.0\n", base, from, to);
                let result = parse(&text);
                if to == from + 1 && to < 4 {
                    assert!(result.is_ok(), "{} -> {}", from, to);
                } else {
                    assert!(result.is_err(), "{} -> {}", from, to);
                }
            }
        }
    }

    #[test]
    fn unknown_records_are_ignored() {
        let net = parse("CAMADA 0 1\nFOO bar\nCAMADA 1 1\nBIAS 1 2.0 # trailing note\n").unwrap();
        assert_eq!(net.biases(0).unwrap(), &[2.0]);
    }

    #[test]
    fn missing_file_fails() {
        let err = Network::load("/definitely/not/here/net.txt").unwrap_err();
        assert!(matches!(err, LoadError::Io(_)));
    }
}
