use super::*;

use std::sync::Arc;

/// Stable handle into a circuit's gate arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct GateId(pub(crate) usize);

/// Where a connection slot draws its value from: another gate's output 0 or
/// an external-input scalar. An unset slot reads as constant false.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Source {
    Gate(GateId),
    Input(String),
}

/// The closed set of computational nodes a circuit is built from.
#[derive(Debug, Clone)]
pub enum GateKind {
    And,
    Or,
    Xor,
    Nand,
    Nor,
    Xnor,
    Not,
    /// Level-sensitive transparent latch: inputs are (data, clock); while the
    /// clock input is true the state follows data. Not an edge detector;
    /// edge behavior is imposed at the circuit level by the tick discipline.
    Latch { state: bool },
    /// Hierarchical instance: an exclusively owned copy of another circuit,
    /// ticked in full once per evaluation pass.
    Sub { circuit: Box<Circuit> },
    /// Lookup-table instance.
    Table { table: Arc<LookupTable> },
    /// Output selector: exposes one bit of a multi-output structural gate.
    /// Synthesized by the parser only, never written directly.
    Select { source: GateId, index: usize },
}

impl GateKind {
    /// The kind tag the tooling layer serializes.
    pub fn tag(&self) -> &'static str {
        match self {
            GateKind::And => "AND",
            GateKind::Or => "OR",
            GateKind::Xor => "XOR",
            GateKind::Nand => "NAND",
            GateKind::Nor => "NOR",
            GateKind::Xnor => "XNOR",
            GateKind::Not => "NOT",
            GateKind::Latch { .. } => "LATCH",
            GateKind::Sub { .. } => "Circuit",
            GateKind::Table { .. } => "LookupTable",
            GateKind::Select { .. } => "OutputSelector",
        }
    }

    /// Structural gates are the multi-output ones: hierarchical and table
    /// instances. Indexed and named output references on them synthesize
    /// selectors.
    pub fn is_structural(&self) -> bool {
        matches!(self, GateKind::Sub { .. } | GateKind::Table { .. })
    }
}

/// A gate: ordered input and output bit vectors, a kind, and the position it
/// was declared at (selectors inherit the position of the connection that
/// synthesized them).
#[derive(Debug, Clone)]
pub struct Gate {
    name: String,
    kind: GateKind,
    inputs: Vec<bool>,
    outputs: Vec<bool>,
    pos: Pos,
}

impl Gate {
    pub(crate) fn new(name: &str, kind: GateKind, pos: Pos) -> Gate {
        let output_count = match &kind {
            GateKind::Sub { circuit } => circuit.output_names().len(),
            GateKind::Table { table } => table.output_width(),
            _ => 1,
        };
        Gate {
            name: name.to_string(),
            kind,
            inputs: vec![],
            outputs: vec![false; output_count],
            pos,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> &GateKind {
        &self.kind
    }

    pub fn inputs(&self) -> &[bool] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[bool] {
        &self.outputs
    }

    pub fn output_count(&self) -> usize {
        self.outputs.len()
    }

    /// The gate's output at `index`; false when the output does not exist.
    pub fn output(&self, index: usize) -> bool {
        self.outputs.get(index).copied().unwrap_or(false)
    }

    pub(crate) fn set_inputs(&mut self, inputs: Vec<bool>) {
        self.inputs = inputs;
    }

    pub(crate) fn set_output0(&mut self, value: bool) {
        if self.outputs.is_empty() {
            self.outputs.push(value);
        } else {
            self.outputs[0] = value;
        }
    }

    /// Recomputes `outputs` from `inputs` for the primitive kinds.
    /// `Sub`, `Table` and `Select` are driven by the tick loop instead: they
    /// need state the primitive compute does not touch.
    pub(crate) fn compute(&mut self) {
        let value = match &mut self.kind {
            GateKind::And => self.inputs.iter().all(|b| *b),
            GateKind::Nand => !self.inputs.iter().all(|b| *b),
            GateKind::Or => self.inputs.iter().any(|b| *b),
            GateKind::Nor => !self.inputs.iter().any(|b| *b),
            GateKind::Xor => self.inputs.iter().filter(|b| **b).count() % 2 == 1,
            GateKind::Xnor => self.inputs.iter().filter(|b| **b).count() % 2 == 0,
            GateKind::Not => !self.inputs.first().copied().unwrap_or(false),
            GateKind::Latch { state } => {
                let data = self.inputs.first().copied().unwrap_or(false);
                let clock = self.inputs.get(1).copied().unwrap_or(false);
                if clock {
                    *state = data;
                }
                *state
            }
            GateKind::Sub { .. } | GateKind::Table { .. } | GateKind::Select { .. } => return,
        };
        self.set_output0(value);
    }

    /// Computes a hierarchical instance: own inputs onto the wrapped
    /// circuit's declared input ports in declared order, one full nested
    /// tick, declared outputs back in declared order.
    pub(crate) fn compute_sub(&mut self, report: &mut TickReport) {
        if let GateKind::Sub { circuit } = &mut self.kind {
            let names = circuit.input_names().to_vec();
            for (i, name) in names.iter().enumerate() {
                circuit.set_input(name, self.inputs.get(i).copied().unwrap_or(false));
            }
            let sub_report = circuit.tick();
            if !sub_report.converged {
                report.converged = false;
            }
            report.table_misses.extend(sub_report.table_misses);
            self.outputs = circuit
                .output_names()
                .iter()
                .map(|name| circuit.output_value(name))
                .collect();
        }
    }

    /// Computes a lookup-table instance: the input vector is read last to
    /// first over the table's declared input width (unwired slots read as
    /// false) to form the query key; a missing key yields an all-false vector
    /// of the table's output width (recorded in the report, never a fault).
    pub(crate) fn compute_table(&mut self, report: &mut TickReport) {
        if let GateKind::Table { table } = &self.kind {
            let mut key = String::with_capacity(table.input_width());
            for i in (0..table.input_width()).rev() {
                let bit = self.inputs.get(i).copied().unwrap_or(false);
                key.push(if bit { '1' } else { '0' });
            }
            match table.get(&key) {
                Some(bits) => self.outputs = bits.clone(),
                None => {
                    self.outputs = vec![false; table.output_width()];
                    report.table_misses.push(TableMiss {
                        table: table.name().to_string(),
                        key,
                    });
                }
            }
        }
    }
}

impl HasPos for Gate {
    fn pos(&self) -> Pos {
        self.pos
    }
}
