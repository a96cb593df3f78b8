use super::*;

use log::*;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

/// The external input that drives the clock discipline in [`Circuit::tick`].
pub const CLOCK_INPUT: &str = "clk";

/// Convergence pass cap per tick. A tick that still has changing gate
/// outputs after this many passes stops silently and keeps the last values.
pub const MAX_PASSES: usize = 100;

/// Declared port metadata: the name, bit width and position as written,
/// kept separate from the expanded scalar maps for the tooling layer.
#[derive(Debug, Clone)]
pub struct PortDef {
    name: String,
    width: usize,
    pos: Pos,
}

impl PortDef {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn width(&self) -> usize {
        self.width
    }
}

impl HasPos for PortDef {
    fn pos(&self) -> Pos {
        self.pos
    }
}

/// What one call to [`Circuit::tick`] observed. `converged` is false when
/// this circuit, or any nested sub-circuit, hit the pass cap; `table_misses`
/// records every lookup-table query that found no row (nested ones included).
#[derive(Debug, Clone, Default)]
pub struct TickReport {
    pub passes: usize,
    pub converged: bool,
    pub table_misses: Vec<TableMiss>,
}

/// A lookup-table query that found no row and yielded all-false.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableMiss {
    pub table: String,
    pub key: String,
}

/// One named, fully elaborated gate/connection/port graph, built by the
/// parser from a single `circuit` block and simulated tick by tick.
#[derive(Debug, Clone)]
pub struct Circuit {
    name: String,
    file: PathBuf,
    pos: Pos,
    level: usize,

    gates: Vec<Gate>,
    gate_ids: BTreeMap<String, GateId>,
    // Connection slots per gate, parallel to the arena. Every gate has an
    // entry, possibly empty.
    connections: Vec<Vec<Option<Source>>>,

    inputs: BTreeMap<String, bool>,
    outputs: BTreeMap<String, Option<GateId>>,
    input_ports: Vec<PortDef>,
    output_ports: Vec<PortDef>,
    input_names: Vec<String>,
    output_names: Vec<String>,

    blocks: BTreeMap<String, Span>,
    tables: BTreeMap<String, Arc<LookupTable>>,

    prev_clk: bool,
    prev_outputs: BTreeMap<String, bool>,
    last_tick: TickReport,
}

impl Circuit {
    pub(crate) fn new(name: &str, file: &std::path::Path, pos: Pos, level: usize) -> Circuit {
        Circuit {
            name: name.to_string(),
            file: file.to_owned(),
            pos,
            level,
            gates: vec![],
            gate_ids: BTreeMap::new(),
            connections: vec![],
            inputs: BTreeMap::new(),
            outputs: BTreeMap::new(),
            input_ports: vec![],
            output_ports: vec![],
            input_names: vec![],
            output_names: vec![],
            blocks: BTreeMap::new(),
            tables: BTreeMap::new(),
            prev_clk: false,
            prev_outputs: BTreeMap::new(),
            last_tick: TickReport::default(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn file(&self) -> &std::path::Path {
        &self.file
    }

    /// Import-recursion depth of the file this circuit was declared in
    /// (root file = 0). Used by tooling only, never by evaluation.
    pub fn level(&self) -> usize {
        self.level
    }

    pub fn input_ports(&self) -> &[PortDef] {
        &self.input_ports
    }

    pub fn output_ports(&self) -> &[PortDef] {
        &self.output_ports
    }

    /// The expanded external-input scalar map.
    pub fn inputs(&self) -> &BTreeMap<String, bool> {
        &self.inputs
    }

    /// The external-output map: each entry is unset until a connection wires
    /// a gate to it.
    pub fn outputs(&self) -> &BTreeMap<String, Option<GateId>> {
        &self.outputs
    }

    /// Expanded input scalar names in declared order.
    pub fn input_names(&self) -> &[String] {
        &self.input_names
    }

    /// Expanded output scalar names in declared order.
    pub fn output_names(&self) -> &[String] {
        &self.output_names
    }

    pub fn gates(&self) -> &[Gate] {
        &self.gates
    }

    pub fn gate(&self, name: &str) -> Option<&Gate> {
        self.gate_ids.get(name).map(|id| &self.gates[id.0])
    }

    /// Source span of each parsed block, keyed by block name.
    pub fn blocks(&self) -> &BTreeMap<String, Span> {
        &self.blocks
    }

    /// The lookup tables declared in this circuit.
    pub fn tables(&self) -> &BTreeMap<String, Arc<LookupTable>> {
        &self.tables
    }

    /// The report of the most recent [`Circuit::tick`].
    pub fn last_tick(&self) -> &TickReport {
        &self.last_tick
    }

    /// Sets an external input scalar. Panics if the input was never declared;
    /// use the expanded name (`a[0]`) for multi-bit ports.
    pub fn set_input(&mut self, name: &str, value: bool) {
        match self.inputs.get_mut(name) {
            Some(slot) => *slot = value,
            None => panic!("no such input in circuit {}: {name}", self.name),
        }
    }

    /// Sets every scalar of a declared multi-bit input port, index for index.
    pub fn set_input_bus(&mut self, name: &str, values: &[bool]) {
        for (i, value) in values.iter().enumerate() {
            self.set_input(&format!("{name}[{i}]"), *value);
        }
    }

    /// Reads an external output. An unwired output yields false. Panics if
    /// the output was never declared.
    pub fn output_value(&self, name: &str) -> bool {
        match self.outputs.get(name) {
            Some(Some(id)) => self.gates[id.0].output(0),
            Some(None) => false,
            None => panic!("no such output in circuit {}: {name}", self.name),
        }
    }

    /// Reads every scalar of a declared multi-bit output port, index for index.
    pub fn output_bus(&self, name: &str) -> Vec<bool> {
        let port = self
            .output_ports
            .iter()
            .find(|p| p.name() == name)
            .unwrap_or_else(|| panic!("no such output port in circuit {}: {name}", self.name));
        (0..port.width())
            .map(|i| self.output_value(&format!("{name}[{i}]")))
            .collect()
    }

    // ----- construction (parser side) -----

    pub(crate) fn add_input_port(&mut self, name: &str, width: Option<usize>, pos: Pos) {
        for key in expand_port(name, width) {
            self.inputs.insert(key.clone(), false);
            self.input_names.push(key);
        }
        self.input_ports.push(PortDef {
            name: name.to_string(),
            width: width.unwrap_or(1),
            pos,
        });
    }

    pub(crate) fn add_output_port(&mut self, name: &str, width: Option<usize>, pos: Pos) {
        for key in expand_port(name, width) {
            self.outputs.insert(key.clone(), None);
            self.output_names.push(key);
        }
        self.output_ports.push(PortDef {
            name: name.to_string(),
            width: width.unwrap_or(1),
            pos,
        });
    }

    pub(crate) fn add_gate(&mut self, name: &str, kind: GateKind, pos: Pos) -> GateId {
        let id = GateId(self.gates.len());
        self.gates.push(Gate::new(name, kind, pos));
        self.connections.push(vec![]);
        self.gate_ids.insert(name.to_string(), id);
        id
    }

    pub(crate) fn add_table(&mut self, table: Arc<LookupTable>) {
        self.tables.insert(table.name().to_string(), table);
    }

    pub(crate) fn set_block_span(&mut self, name: &str, span: Span) {
        self.blocks.insert(name.to_string(), span);
    }

    pub(crate) fn gate_id(&self, name: &str) -> Option<GateId> {
        self.gate_ids.get(name).copied()
    }

    pub(crate) fn gate_by_id(&self, id: GateId) -> &Gate {
        &self.gates[id.0]
    }

    /// The embedded circuit of a hierarchical instance gate, if it is one.
    pub(crate) fn sub_circuit(&self, id: GateId) -> Option<&Circuit> {
        match self.gates[id.0].kind() {
            GateKind::Sub { circuit } => Some(circuit),
            _ => None,
        }
    }

    /// Synthesizes (or reuses) the output-selector gate exposing output
    /// `index` of a multi-output structural gate. This is how "pick output i"
    /// becomes representable in the flat graph.
    pub(crate) fn select_output(&mut self, base: &str, source: GateId, index: usize, pos: Pos) -> GateId {
        let name = format!("{base}.out[{index}]");
        if let Some(id) = self.gate_ids.get(&name) {
            return *id;
        }
        debug!("circuit {}: synthesizing output selector {name}", self.name);
        self.add_gate(&name, GateKind::Select { source, index }, pos)
    }

    pub(crate) fn connect_gate_input(&mut self, id: GateId, slot: usize, source: Source) {
        let slots = &mut self.connections[id.0];
        if slots.len() <= slot {
            slots.resize(slot + 1, None);
        }
        slots[slot] = Some(source);
    }

    pub(crate) fn connect_output(&mut self, name: &str, driver: GateId) {
        self.outputs.insert(name.to_string(), Some(driver));
    }

    // ----- evaluation -----

    /// Advances the circuit by one simulated step.
    ///
    /// Samples `clk` (false if undeclared) and detects the rising edge,
    /// snapshots the wired external outputs, then runs up to [`MAX_PASSES`]
    /// convergence passes: rebuild every gate's inputs from the connection
    /// slots, compute hierarchical instances, then table instances, then
    /// every other gate, then output selectors last, and stop early once no
    /// gate's output 0 changed. Finally, while the clock stays high past the
    /// rising edge, every wired external output is forced back to its
    /// snapshot, so sequentially driven outputs hold through the high phase.
    ///
    /// Never faults: non-convergence and lookup-table misses are reported in
    /// the returned [`TickReport`] and keep their silent default behavior.
    pub fn tick(&mut self) -> TickReport {
        let clk = self.inputs.get(CLOCK_INPUT).copied().unwrap_or(false);
        let rising = clk && !self.prev_clk;
        self.prev_clk = clk;

        self.prev_outputs.clear();
        for (name, driver) in &self.outputs {
            if let Some(id) = driver {
                self.prev_outputs.insert(name.clone(), self.gates[id.0].output(0));
            }
        }

        let mut report = TickReport {
            passes: 0,
            converged: true,
            table_misses: vec![],
        };
        let mut settled = false;

        for _pass in 0..MAX_PASSES {
            report.passes += 1;
            let before: Vec<bool> = self.gates.iter().map(|g| g.output(0)).collect();

            // (a) every gate's input vector, strictly from the connection slots
            let rebuilt: Vec<Vec<bool>> = self
                .connections
                .iter()
                .map(|slots| {
                    slots
                        .iter()
                        .map(|slot| match slot {
                            Some(Source::Gate(id)) => self.gates[id.0].output(0),
                            Some(Source::Input(name)) => {
                                self.inputs.get(name).copied().unwrap_or(false)
                            }
                            None => false,
                        })
                        .collect()
                })
                .collect();
            for (gate, inputs) in self.gates.iter_mut().zip(rebuilt) {
                gate.set_inputs(inputs);
            }

            // (b) hierarchical instances: one full nested tick each
            for gate in self.gates.iter_mut() {
                gate.compute_sub(&mut report);
            }
            // (c) table instances
            for gate in self.gates.iter_mut() {
                gate.compute_table(&mut report);
            }
            // (d) everything else
            for gate in self.gates.iter_mut() {
                gate.compute();
            }
            // (e) output selectors last: they read this pass's structural results
            for id in 0..self.gates.len() {
                let selected = match self.gates[id].kind() {
                    GateKind::Select { source, index } => Some((*source, *index)),
                    _ => None,
                };
                if let Some((source, index)) = selected {
                    let value = self.gates[source.0].output(index);
                    self.gates[id].set_output0(value);
                }
            }

            // (f) early out once every gate's output 0 is stable
            let changed = self
                .gates
                .iter()
                .zip(&before)
                .any(|(gate, b)| gate.output(0) != *b);
            if !changed {
                settled = true;
                break;
            }
        }

        if !settled {
            debug!(
                "circuit {}: no convergence after {MAX_PASSES} passes, keeping last values",
                self.name
            );
            report.converged = false;
        }

        // Hold: clock high and not the rising edge means this tick's
        // recomputation of the wired outputs is discarded.
        if clk && !rising {
            let held: Vec<(GateId, bool)> = self
                .outputs
                .iter()
                .filter_map(|(name, driver)| {
                    let id = (*driver)?;
                    let value = self.prev_outputs.get(name).copied()?;
                    Some((id, value))
                })
                .collect();
            for (id, value) in held {
                self.gates[id.0].set_output0(value);
            }
        }

        self.last_tick = report.clone();
        report
    }

    /// Strict variant of [`Circuit::tick`]: fails on the first lookup-table
    /// query that found no row, instead of silently yielding all-false.
    pub fn tick_strict(&mut self) -> Result<TickReport, TableMiss> {
        let report = self.tick();
        match report.table_misses.first() {
            Some(miss) => Err(miss.clone()),
            None => Ok(report),
        }
    }
}

impl HasPos for Circuit {
    fn pos(&self) -> Pos {
        self.pos
    }
}

/// The scalar entries a declared port expands to: `name` alone for a bare
/// port, `name[0]..name[N-1]` for `name[N]` (never a bare `name` alongside).
fn expand_port(name: &str, width: Option<usize>) -> Vec<String> {
    match width {
        None => vec![name.to_string()],
        Some(n) => (0..n).map(|i| format!("{name}[{i}]")).collect(),
    }
}
