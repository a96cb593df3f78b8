use super::*;

use log::*;
use once_cell::sync::Lazy;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

/// The extension appended to import names before resolving them against the
/// base directory.
pub const FILE_EXTENSION: &str = "circuit";

static GATE_TYPES: Lazy<BTreeMap<&'static str, fn() -> GateKind>> = Lazy::new(|| {
    BTreeMap::from([
        ("AND", (|| GateKind::And) as fn() -> GateKind),
        ("OR", || GateKind::Or),
        ("XOR", || GateKind::Xor),
        ("NAND", || GateKind::Nand),
        ("NOR", || GateKind::Nor),
        ("XNOR", || GateKind::Xnor),
        ("NOT", || GateKind::Not),
        ("LATCH", || GateKind::Latch { state: false }),
    ])
});

/// Reads a `.circuit` file and parses it, resolving imports against the
/// file's own directory.
pub fn load_circuits_from_file<P: AsRef<std::path::Path>>(
    path: P,
) -> Result<BTreeMap<String, Circuit>, Fault> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path).map_err(|e| {
        Fault::Import(
            Pos::unknown(),
            format!("cannot read {}: {e}", path.display()),
            None,
        )
    })?;
    let tokens = tokenize(&text)?;
    let base_dir = path.parent().map(|p| p.to_owned()).unwrap_or_default();
    parse_circuits(&tokens, &base_dir, path, None, 0)
}

/// Parses circuits from an in-memory string. Imports resolve against the
/// current directory.
pub fn parse_circuits_from_string(text: &str) -> Result<BTreeMap<String, Circuit>, Fault> {
    let tokens = tokenize(text)?;
    parse_circuits(
        &tokens,
        std::path::Path::new("."),
        std::path::Path::new("<string>"),
        None,
        0,
    )
}

/// Parses a token stream into one [`Circuit`] per `circuit` declaration.
///
/// `import` items re-lex and re-parse the named file at `level + 1` and merge
/// its circuits into the result: same-name entries are overwritten, last one
/// wins. `original_file` is the root file of the traversal (defaults to
/// `file`); it is threaded through the import recursion for tooling.
pub fn parse_circuits(
    tokens: &[Token],
    base_dir: &std::path::Path,
    file: &std::path::Path,
    original_file: Option<&std::path::Path>,
    level: usize,
) -> Result<BTreeMap<String, Circuit>, Fault> {
    let mut session = ParseSession::default();
    let original = original_file.unwrap_or(file);
    Parser::new(tokens, base_dir, file, original, level).parse_file(&mut session)?;
    Ok(session.circuits)
}

/// Parse state threaded explicitly through the import recursion: the
/// circuits and lookup tables seen so far in this traversal. Lookup tables
/// are visible to every circuit parsed after them, across imports.
#[derive(Debug, Default)]
struct ParseSession {
    circuits: BTreeMap<String, Circuit>,
    tables: BTreeMap<String, Arc<LookupTable>>,
}

struct Parser<'a> {
    tokens: &'a [Token],
    idx: usize,
    base_dir: PathBuf,
    file: PathBuf,
    original_file: PathBuf,
    level: usize,
}

/// One `name`, `name[i]`, `gate.out`, `gate.out[i]`, `gate.out.named`,
/// `gate.in[i]` or `gate.in.named` reference in a connection.
#[derive(Debug, Clone)]
struct RefExpr {
    base: String,
    base_index: Option<usize>,
    port: Option<String>,
    index: Option<usize>,
    named: Option<String>,
    pos: Pos,
}

/// One scalar endpoint a connection target expands to.
enum TargetSlot {
    GateIn(GateId, usize),
    Output(String),
}

impl<'a> Parser<'a> {
    fn new(
        tokens: &'a [Token],
        base_dir: &std::path::Path,
        file: &std::path::Path,
        original_file: &std::path::Path,
        level: usize,
    ) -> Parser<'a> {
        Parser {
            tokens,
            idx: 0,
            base_dir: base_dir.to_owned(),
            file: file.to_owned(),
            original_file: original_file.to_owned(),
            level,
        }
    }

    fn peek(&self) -> Token {
        self.tokens
            .get(self.idx)
            .cloned()
            .unwrap_or_else(|| Token::new(TokenKind::Eof, "", Pos::unknown()))
    }

    fn next(&mut self) -> Token {
        let token = self.peek();
        if token.kind != TokenKind::Eof {
            self.idx += 1;
        }
        token
    }

    fn at(&self, kind: TokenKind) -> bool {
        self.peek().kind == kind
    }

    fn expect(&mut self, kind: TokenKind, what: &str) -> Result<Token, Fault> {
        let token = self.peek();
        if token.kind == kind {
            self.idx += 1;
            Ok(token)
        } else {
            Err(Fault::Syntax(
                token.pos,
                format!("expected {what} but found {}", token.describe()),
            ))
        }
    }

    fn parse_file(&mut self, session: &mut ParseSession) -> Result<(), Fault> {
        loop {
            let token = self.peek();
            match token.kind {
                TokenKind::Eof => return Ok(()),
                TokenKind::KwImport => self.parse_import(session)?,
                TokenKind::KwCircuit => {
                    let circuit = self.parse_circuit(session)?;
                    if session.circuits.contains_key(circuit.name()) {
                        debug!(
                            "circuit {} redefined in {}; last definition wins",
                            circuit.name(),
                            self.file.display(),
                        );
                    }
                    session.circuits.insert(circuit.name().to_string(), circuit);
                }
                _ => {
                    return Err(Fault::Syntax(
                        token.pos,
                        format!("expected `circuit` or `import` but found {}", token.describe()),
                    ))
                }
            }
        }
    }

    fn parse_import(&mut self, session: &mut ParseSession) -> Result<(), Fault> {
        let kw = self.next();
        let name = self.expect(TokenKind::Str, "an import file name")?;
        let path = self.base_dir.join(format!("{}.{FILE_EXTENSION}", name.text));
        info!(
            "importing {} (root file {})",
            path.display(),
            self.original_file.display(),
        );

        let text = std::fs::read_to_string(&path).map_err(|e| {
            Fault::Import(kw.pos, format!("cannot read {}: {e}", path.display()), None)
        })?;
        let wrap = |fault: Fault| {
            Fault::Import(kw.pos, format!("in {}", path.display()), Some(Box::new(fault)))
        };
        let tokens = tokenize(&text).map_err(wrap)?;
        Parser::new(&tokens, &self.base_dir, &path, &self.original_file, self.level + 1)
            .parse_file(session)
            .map_err(wrap)
    }

    fn parse_circuit(&mut self, session: &mut ParseSession) -> Result<Circuit, Fault> {
        let kw = self.next();
        let name = self.expect(TokenKind::Ident, "a circuit name")?;
        self.expect(TokenKind::LBrace, "`{`")?;
        debug!("parsing circuit {} at {}", name.text, kw.pos);

        let mut circuit = Circuit::new(&name.text, &self.file, kw.pos, self.level);
        loop {
            let token = self.peek();
            match token.kind {
                TokenKind::RBrace => {
                    self.next();
                    return Ok(circuit);
                }
                TokenKind::KwInputs => {
                    self.next();
                    let end = self.parse_ports(&mut circuit, true)?;
                    circuit.set_block_span("inputs", Span::new(token.pos, end));
                }
                TokenKind::KwOutputs => {
                    self.next();
                    let end = self.parse_ports(&mut circuit, false)?;
                    circuit.set_block_span("outputs", Span::new(token.pos, end));
                }
                TokenKind::KwGates => {
                    self.next();
                    let end = self.parse_gates(&mut circuit, session)?;
                    circuit.set_block_span("gates", Span::new(token.pos, end));
                }
                TokenKind::KwLookupTables => {
                    self.next();
                    let end = self.parse_lookup_tables(&mut circuit, session)?;
                    circuit.set_block_span("lookup_tables", Span::new(token.pos, end));
                }
                TokenKind::KwConnections => {
                    self.next();
                    let end = self.parse_connections(&mut circuit)?;
                    circuit.set_block_span("connections", Span::new(token.pos, end));
                }
                _ => {
                    return Err(Fault::Syntax(
                        token.pos,
                        format!("expected a block or `}}` but found {}", token.describe()),
                    ))
                }
            }
        }
    }

    fn parse_ports(&mut self, circuit: &mut Circuit, is_input: bool) -> Result<Pos, Fault> {
        self.expect(TokenKind::LBrace, "`{`")?;
        loop {
            let token = self.peek();
            match token.kind {
                TokenKind::RBrace => {
                    self.next();
                    return Ok(token.pos);
                }
                TokenKind::Comma => {
                    self.next();
                }
                TokenKind::Ident => {
                    let name = self.next();
                    let width = if self.at(TokenKind::LBracket) {
                        Some(self.parse_index()?)
                    } else {
                        None
                    };
                    if is_input {
                        circuit.add_input_port(&name.text, width, name.pos);
                    } else {
                        circuit.add_output_port(&name.text, width, name.pos);
                    }
                }
                _ => {
                    return Err(Fault::Syntax(
                        token.pos,
                        format!("expected a port name or `}}` but found {}", token.describe()),
                    ))
                }
            }
        }
    }

    fn parse_gates(&mut self, circuit: &mut Circuit, session: &ParseSession) -> Result<Pos, Fault> {
        self.expect(TokenKind::LBrace, "`{`")?;
        loop {
            let token = self.peek();
            match token.kind {
                TokenKind::RBrace => {
                    self.next();
                    return Ok(token.pos);
                }
                TokenKind::Comma => {
                    self.next();
                }
                TokenKind::Ident => {
                    let name = self.next();
                    self.expect(TokenKind::Eq, "`=`")?;
                    let typ = self.expect(TokenKind::Ident, "a gate type")?;
                    self.expect(TokenKind::LParen, "`(`")?;
                    let kind = match typ.text.as_str() {
                        "Circuit" => {
                            let reference = self.expect(TokenKind::Str, "a circuit name")?;
                            match session.circuits.get(&reference.text) {
                                Some(definition) => GateKind::Sub {
                                    circuit: Box::new(definition.clone()),
                                },
                                None => {
                                    return Err(Fault::Gate(
                                        reference.pos,
                                        format!("no such circuit: {}", reference.text),
                                    ))
                                }
                            }
                        }
                        "LookupTable" => {
                            let reference = self.expect(TokenKind::Str, "a lookup table name")?;
                            match session.tables.get(&reference.text) {
                                Some(table) => GateKind::Table {
                                    table: table.clone(),
                                },
                                None => {
                                    return Err(Fault::Gate(
                                        reference.pos,
                                        format!("no such lookup table: {}", reference.text),
                                    ))
                                }
                            }
                        }
                        _ => match GATE_TYPES.get(typ.text.as_str()) {
                            Some(make) => make(),
                            None => {
                                return Err(Fault::Gate(
                                    typ.pos,
                                    format!("unknown gate type: {}", typ.text),
                                ))
                            }
                        },
                    };
                    self.expect(TokenKind::RParen, "`)`")?;
                    circuit.add_gate(&name.text, kind, name.pos);
                }
                _ => {
                    return Err(Fault::Syntax(
                        token.pos,
                        format!("expected a gate or `}}` but found {}", token.describe()),
                    ))
                }
            }
        }
    }

    fn parse_lookup_tables(
        &mut self,
        circuit: &mut Circuit,
        session: &mut ParseSession,
    ) -> Result<Pos, Fault> {
        self.expect(TokenKind::LBrace, "`{`")?;
        loop {
            let token = self.peek();
            match token.kind {
                TokenKind::RBrace => {
                    self.next();
                    return Ok(token.pos);
                }
                TokenKind::Comma => {
                    self.next();
                }
                TokenKind::Ident => {
                    let name = self.next();
                    self.expect(TokenKind::Eq, "`=`")?;
                    self.expect(TokenKind::LBrace, "`{`")?;
                    let mut table = LookupTable::new(&name.text, name.pos);
                    loop {
                        let row = self.peek();
                        match row.kind {
                            TokenKind::RBrace => {
                                self.next();
                                break;
                            }
                            TokenKind::Comma => {
                                self.next();
                            }
                            TokenKind::Num => {
                                let pattern = self.next();
                                self.expect(TokenKind::Arrow, "`->`")?;
                                let bits = self.expect(TokenKind::Num, "output bits")?;
                                table.add_row(pattern.text, bits_from_literal(&bits.text));
                            }
                            _ => {
                                return Err(Fault::Syntax(
                                    row.pos,
                                    format!(
                                        "expected a bit pattern or `}}` but found {}",
                                        row.describe(),
                                    ),
                                ))
                            }
                        }
                    }
                    let table = Arc::new(table);
                    if session.tables.contains_key(table.name()) {
                        debug!("lookup table {} redefined; last definition wins", table.name());
                    }
                    session.tables.insert(table.name().to_string(), table.clone());
                    circuit.add_table(table);
                }
                _ => {
                    return Err(Fault::Syntax(
                        token.pos,
                        format!(
                            "expected a lookup table or `}}` but found {}",
                            token.describe(),
                        ),
                    ))
                }
            }
        }
    }

    fn parse_connections(&mut self, circuit: &mut Circuit) -> Result<Pos, Fault> {
        self.expect(TokenKind::LBrace, "`{`")?;
        loop {
            let token = self.peek();
            match token.kind {
                TokenKind::RBrace => {
                    self.next();
                    return Ok(token.pos);
                }
                TokenKind::Comma => {
                    self.next();
                }
                TokenKind::Ident => {
                    let source = self.parse_ref()?;
                    self.expect(TokenKind::Arrow, "`->`")?;
                    let target = self.parse_ref()?;
                    self.connect(circuit, &source, &target)?;
                }
                _ => {
                    return Err(Fault::Syntax(
                        token.pos,
                        format!(
                            "expected a connection or `}}` but found {}",
                            token.describe(),
                        ),
                    ))
                }
            }
        }
    }

    fn parse_ref(&mut self) -> Result<RefExpr, Fault> {
        let base = self.expect(TokenKind::Ident, "a name")?;
        let mut reference = RefExpr {
            base: base.text,
            base_index: None,
            port: None,
            index: None,
            named: None,
            pos: base.pos,
        };

        if self.at(TokenKind::LBracket) {
            reference.base_index = Some(self.parse_index()?);
            return Ok(reference);
        }

        if self.at(TokenKind::Dot) {
            self.next();
            let port = self.expect(TokenKind::Ident, "`in` or `out`")?;
            if port.text != "in" && port.text != "out" {
                return Err(Fault::Syntax(
                    port.pos,
                    format!("expected `in` or `out` but found `{}`", port.text),
                ));
            }
            reference.port = Some(port.text);

            if self.at(TokenKind::LBracket) {
                reference.index = Some(self.parse_index()?);
            } else if self.at(TokenKind::Dot) {
                self.next();
                let named = self.expect(TokenKind::Ident, "a port name")?;
                reference.named = Some(named.text);
            }
        }
        Ok(reference)
    }

    fn parse_index(&mut self) -> Result<usize, Fault> {
        self.expect(TokenKind::LBracket, "`[`")?;
        let num = self.expect(TokenKind::Num, "an index")?;
        self.expect(TokenKind::RBracket, "`]`")?;
        num.text
            .parse::<usize>()
            .map_err(|_| Fault::Syntax(num.pos, format!("index out of range: {}", num.text)))
    }

    fn connect(&self, circuit: &mut Circuit, source: &RefExpr, target: &RefExpr) -> Result<(), Fault> {
        let sources = self.resolve_source(circuit, source)?;
        let targets = self.resolve_target(circuit, target)?;
        if sources.len() != targets.len() {
            return Err(Fault::Connection(
                target.pos,
                format!(
                    "width mismatch: source {} is {} bit(s) but target {} is {} bit(s)",
                    source.base,
                    sources.len(),
                    target.base,
                    targets.len(),
                ),
            ));
        }
        for (src, tgt) in sources.into_iter().zip(targets) {
            match tgt {
                TargetSlot::GateIn(id, slot) => circuit.connect_gate_input(id, slot, src),
                TargetSlot::Output(name) => match src {
                    Source::Gate(id) => circuit.connect_output(&name, id),
                    Source::Input(_) => {
                        return Err(Fault::Connection(
                            target.pos,
                            format!("output {name} must be driven by a gate"),
                        ))
                    }
                },
            }
        }
        Ok(())
    }

    fn resolve_source(&self, circuit: &mut Circuit, r: &RefExpr) -> Result<Vec<Source>, Fault> {
        match r.port.as_deref() {
            None => {
                if let Some(i) = r.base_index {
                    let key = format!("{}[{i}]", r.base);
                    if circuit.inputs().contains_key(&key) {
                        Ok(vec![Source::Input(key)])
                    } else {
                        Err(Fault::Connection(r.pos, format!("no such input: {key}")))
                    }
                } else if circuit.inputs().contains_key(&r.base) {
                    Ok(vec![Source::Input(r.base.clone())])
                } else if let Some(id) = circuit.gate_id(&r.base) {
                    Ok(vec![Source::Gate(id)])
                } else if let Some((_offset, width)) = port_range(circuit.input_ports(), &r.base) {
                    Ok((0..width)
                        .map(|i| Source::Input(format!("{}[{i}]", r.base)))
                        .collect())
                } else {
                    Err(Fault::Connection(
                        r.pos,
                        format!("unresolved connection source: {}", r.base),
                    ))
                }
            }
            Some("out") => {
                let id = circuit
                    .gate_id(&r.base)
                    .ok_or_else(|| Fault::Connection(r.pos, format!("no such gate: {}", r.base)))?;
                let structural = circuit.gate_by_id(id).kind().is_structural();
                let output_count = circuit.gate_by_id(id).output_count();

                if let Some(named) = &r.named {
                    let (start, width) = {
                        let sub = circuit.sub_circuit(id).ok_or_else(|| {
                            Fault::Connection(
                                r.pos,
                                format!(
                                    "named outputs are only available on circuit instances: {}",
                                    r.base,
                                ),
                            )
                        })?;
                        port_range(sub.output_ports(), named).ok_or_else(|| {
                            Fault::Connection(
                                r.pos,
                                format!("circuit {} has no output named {named}", sub.name()),
                            )
                        })?
                    };
                    Ok((start..start + width)
                        .map(|i| Source::Gate(circuit.select_output(&r.base, id, i, r.pos)))
                        .collect())
                } else if let Some(i) = r.index {
                    if structural {
                        if i >= output_count {
                            Err(Fault::Connection(
                                r.pos,
                                format!(
                                    "bad output index {i} on {} ({} output(s))",
                                    r.base, output_count,
                                ),
                            ))
                        } else {
                            Ok(vec![Source::Gate(circuit.select_output(&r.base, id, i, r.pos))])
                        }
                    } else if i == 0 {
                        Ok(vec![Source::Gate(id)])
                    } else {
                        Err(Fault::Connection(
                            r.pos,
                            format!("bad output index {i} on {}: gates have one output", r.base),
                        ))
                    }
                } else if structural && output_count != 1 {
                    Ok((0..output_count)
                        .map(|i| Source::Gate(circuit.select_output(&r.base, id, i, r.pos)))
                        .collect())
                } else {
                    Ok(vec![Source::Gate(id)])
                }
            }
            Some(_) => Err(Fault::Connection(
                r.pos,
                format!("{}.in cannot be used as a connection source", r.base),
            )),
        }
    }

    fn resolve_target(&self, circuit: &Circuit, r: &RefExpr) -> Result<Vec<TargetSlot>, Fault> {
        match r.port.as_deref() {
            None => {
                if let Some(i) = r.base_index {
                    let key = format!("{}[{i}]", r.base);
                    if circuit.outputs().contains_key(&key) {
                        Ok(vec![TargetSlot::Output(key)])
                    } else {
                        Err(Fault::Connection(r.pos, format!("no such output: {key}")))
                    }
                } else if circuit.outputs().contains_key(&r.base) {
                    Ok(vec![TargetSlot::Output(r.base.clone())])
                } else if let Some((_offset, width)) = port_range(circuit.output_ports(), &r.base) {
                    Ok((0..width)
                        .map(|i| TargetSlot::Output(format!("{}[{i}]", r.base)))
                        .collect())
                } else {
                    Err(Fault::Connection(
                        r.pos,
                        format!("unresolved connection target: {}", r.base),
                    ))
                }
            }
            Some("in") => {
                let id = circuit
                    .gate_id(&r.base)
                    .ok_or_else(|| Fault::Connection(r.pos, format!("no such gate: {}", r.base)))?;

                if let Some(named) = &r.named {
                    let sub = circuit.sub_circuit(id).ok_or_else(|| {
                        Fault::Connection(
                            r.pos,
                            format!(
                                "named inputs are only available on circuit instances: {}",
                                r.base,
                            ),
                        )
                    })?;
                    let (start, width) = port_range(sub.input_ports(), named).ok_or_else(|| {
                        Fault::Connection(
                            r.pos,
                            format!("circuit {} has no input named {named}", sub.name()),
                        )
                    })?;
                    Ok((start..start + width)
                        .map(|i| TargetSlot::GateIn(id, i))
                        .collect())
                } else if let Some(i) = r.index {
                    match circuit.gate_by_id(id).kind() {
                        GateKind::Not if i != 0 => {
                            return Err(Fault::Connection(
                                r.pos,
                                format!(
                                    "bad input index {i} on {}: NOT takes exactly one input",
                                    r.base,
                                ),
                            ))
                        }
                        GateKind::Table { table } if i >= table.input_width() => {
                            return Err(Fault::Connection(
                                r.pos,
                                format!(
                                    "bad input index {i} on {}: table {} takes {} input(s)",
                                    r.base,
                                    table.name(),
                                    table.input_width(),
                                ),
                            ))
                        }
                        _ => {}
                    }
                    Ok(vec![TargetSlot::GateIn(id, i)])
                } else {
                    Err(Fault::Connection(
                        r.pos,
                        format!("expected an input index or named input on {}", r.base),
                    ))
                }
            }
            Some(_) => Err(Fault::Connection(
                r.pos,
                format!("{}.out cannot be a connection target", r.base),
            )),
        }
    }
}

/// The expanded scalar offset and width of a declared port, walking the
/// declaration order.
fn port_range(ports: &[PortDef], name: &str) -> Option<(usize, usize)> {
    let mut offset = 0;
    for port in ports {
        if port.name() == name {
            return Some((offset, port.width()));
        }
        offset += port.width();
    }
    None
}

/// Output bit vectors store bit 0 as the rightmost character of the literal.
fn bits_from_literal(text: &str) -> Vec<bool> {
    text.chars().rev().map(|c| c == '1').collect()
}
