use super::*;

use serde_json::json;

/// Serializes a circuit's structure as JSON for editors and other tooling:
/// ports with widths and positions, gates with kind tags, lookup tables with
/// their rows, and the source span of each block.
pub fn describe(circuit: &Circuit) -> serde_json::Value {
    let ports = |ports: &[PortDef]| -> Vec<serde_json::Value> {
        ports
            .iter()
            .map(|port| {
                json!({
                    "name": port.name(),
                    "width": port.width(),
                    "pos": pos_json(port.pos()),
                })
            })
            .collect()
    };

    let gates: Vec<serde_json::Value> = circuit
        .gates()
        .iter()
        .map(|gate| {
            json!({
                "name": gate.name(),
                "kind": gate.kind().tag(),
                "pos": pos_json(gate.pos()),
            })
        })
        .collect();

    let tables: Vec<serde_json::Value> = circuit
        .tables()
        .values()
        .map(|table| {
            let rows: Vec<serde_json::Value> = table
                .rows()
                .iter()
                .map(|(pattern, bits)| {
                    json!({
                        "pattern": pattern,
                        "bits": bits,
                    })
                })
                .collect();
            json!({
                "name": table.name(),
                "input_width": table.input_width(),
                "output_width": table.output_width(),
                "pos": pos_json(table.pos()),
                "rows": rows,
            })
        })
        .collect();

    let blocks: serde_json::Map<String, serde_json::Value> = circuit
        .blocks()
        .iter()
        .map(|(name, span)| {
            (
                name.clone(),
                json!({
                    "start": pos_json(span.start()),
                    "end": pos_json(span.end()),
                }),
            )
        })
        .collect();

    json!({
        "name": circuit.name(),
        "file": circuit.file().display().to_string(),
        "pos": pos_json(circuit.pos()),
        "level": circuit.level(),
        "inputs": ports(circuit.input_ports()),
        "outputs": ports(circuit.output_ports()),
        "gates": gates,
        "lookup_tables": tables,
        "blocks": blocks,
    })
}

fn pos_json(pos: Pos) -> serde_json::Value {
    json!({
        "line": pos.line(),
        "col": pos.col(),
    })
}
