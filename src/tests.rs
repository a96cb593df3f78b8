use super::*;

fn load(text: &str, name: &str) -> Circuit {
    let mut circuits = parse_circuits_from_string(text).unwrap();
    circuits
        .remove(name)
        .unwrap_or_else(|| panic!("no circuit {name} in source"))
}

const HALF_ADDER: &str = "
    circuit HalfAdder {
        inputs { a, b }
        outputs { sum, carry }
        gates {
            x = XOR()
            c = AND()
        }
        connections {
            a -> x.in[0]
            b -> x.in[1]
            a -> c.in[0]
            b -> c.in[1]
            x.out -> sum
            c.out -> carry
        }
    }
";

const FULL_ADDER: &str = "
    circuit FullAdder {
        inputs { a, b, cin }
        outputs { sum, cout }
        gates {
            ha1 = Circuit(\"HalfAdder\")
            ha2 = Circuit(\"HalfAdder\")
            orc = OR()
        }
        connections {
            a -> ha1.in.a
            b -> ha1.in.b
            ha1.out.sum -> ha2.in.a
            cin -> ha2.in.b
            ha2.out.sum -> sum
            ha1.out.carry -> orc.in[0]
            ha2.out.carry -> orc.in[1]
            orc.out -> cout
        }
    }
";

#[test]
fn and_gate_settles_combinationally() {
    let mut circuit = load(
        "
        circuit AndGate {
            inputs { a, b }
            outputs { q }
            gates { g = AND() }
            connections {
                a -> g.in[0]
                b -> g.in[1]
                g.out -> q
            }
        }
        ",
        "AndGate",
    );

    for a in [false, true] {
        for b in [false, true] {
            circuit.set_input("a", a);
            circuit.set_input("b", b);
            let report = circuit.tick();
            assert!(report.converged);
            assert_eq!(circuit.output_value("q"), a && b);
        }
    }
}

#[test]
fn nor_latch_remembers_and_oscillates_when_unsettled() {
    let mut latch = load(
        "
        circuit NorLatch {
            inputs { s, r }
            outputs { q, qn }
            gates {
                n1 = NOR()
                n2 = NOR()
            }
            connections {
                r -> n1.in[0]
                n2.out -> n1.in[1]
                s -> n2.in[0]
                n1.out -> n2.in[1]
                n1.out -> q
                n2.out -> qn
            }
        }
        ",
        "NorLatch",
    );

    // Both inputs low from the all-false start: the cross-coupled pair
    // oscillates with period 2 and the pass cap cuts it off.
    let report = latch.tick();
    assert_eq!(report.passes, MAX_PASSES);
    assert!(!report.converged);
    assert_eq!(latch.output_value("q"), false);

    latch.set_input("s", true);
    let report = latch.tick();
    assert!(report.converged);
    assert_eq!(latch.output_value("q"), true);

    latch.set_input("s", false);
    latch.tick();
    assert_eq!(latch.output_value("q"), true);

    latch.set_input("r", true);
    let report = latch.tick();
    assert!(report.converged);
    assert_eq!(latch.output_value("q"), false);
}

#[test]
fn nor_register_captures_data_on_the_rising_edge() {
    let mut reg = load(
        "
        circuit Register {
            inputs { data, clk }
            outputs { q }
            gates {
                nd = NOT()
                s = AND()
                r = AND()
                n1 = NOR()
                n2 = NOR()
            }
            connections {
                data -> nd.in[0]
                data -> s.in[0]
                clk -> s.in[1]
                nd.out -> r.in[0]
                clk -> r.in[1]
                r.out -> n1.in[0]
                n2.out -> n1.in[1]
                s.out -> n2.in[0]
                n1.out -> n2.in[1]
                n1.out -> q
            }
        }
        ",
        "Register",
    );

    // clock low, nothing captured yet
    reg.set_input("data", true);
    reg.tick();
    assert_eq!(reg.output_value("q"), false);

    // rising edge captures data
    reg.set_input("clk", true);
    let report = reg.tick();
    assert!(report.converged);
    assert_eq!(reg.output_value("q"), true);

    // clock back low, data gone: the latch pair keeps the bit
    reg.set_input("data", false);
    reg.set_input("clk", false);
    reg.tick();
    assert_eq!(reg.output_value("q"), true);

    // next edge captures the new data
    reg.set_input("clk", true);
    reg.tick();
    assert_eq!(reg.output_value("q"), false);
}

#[test]
fn full_adder_from_two_half_adders() {
    let source = format!("{HALF_ADDER}\n{FULL_ADDER}");
    let mut adder = load(&source, "FullAdder");

    for a in [false, true] {
        for b in [false, true] {
            for cin in [false, true] {
                adder.set_input("a", a);
                adder.set_input("b", b);
                adder.set_input("cin", cin);
                let report = adder.tick();
                assert!(report.converged);
                let total = a as usize + b as usize + cin as usize;
                assert_eq!(adder.output_value("sum"), total % 2 == 1, "sum of {total}");
                assert_eq!(adder.output_value("cout"), total >= 2, "cout of {total}");
            }
        }
    }
}

#[test]
fn named_output_references_synthesize_selector_gates() {
    let source = format!("{HALF_ADDER}\n{FULL_ADDER}");
    let adder = load(&source, "FullAdder");

    let selector = adder.gate("ha1.out[0]").unwrap();
    assert_eq!(selector.kind().tag(), "OutputSelector");
    assert!(adder.gate("ha1.out[1]").is_some());
    assert!(adder.gate("ha2.out[0]").is_some());
}

#[test]
fn clock_high_holds_outputs_until_the_next_fall() {
    let mut inv = load(
        "
        circuit Inv {
            inputs { d, clk }
            outputs { q }
            gates { n = NOT() }
            connections {
                d -> n.in[0]
                n.out -> q
            }
        }
        ",
        "Inv",
    );

    // clock low: transparent
    inv.set_input("d", true);
    inv.tick();
    assert_eq!(inv.output_value("q"), false);

    // rising edge: the freshly computed value passes through
    inv.set_input("clk", true);
    inv.set_input("d", false);
    inv.tick();
    assert_eq!(inv.output_value("q"), true);

    // clock still high: the output holds even though d changed back
    inv.set_input("d", true);
    inv.tick();
    assert_eq!(inv.output_value("q"), true);
    inv.tick();
    assert_eq!(inv.output_value("q"), true);

    // clock falls: transparent again
    inv.set_input("clk", false);
    inv.tick();
    assert_eq!(inv.output_value("q"), false);
}

#[test]
fn latch_gate_follows_data_while_enabled() {
    let mut cell = load(
        "
        circuit Cell {
            inputs { d, en }
            outputs { q }
            gates { l = LATCH() }
            connections {
                d -> l.in[0]
                en -> l.in[1]
                l.out -> q
            }
        }
        ",
        "Cell",
    );

    cell.set_input("d", true);
    cell.set_input("en", true);
    cell.tick();
    assert_eq!(cell.output_value("q"), true);

    cell.set_input("d", false);
    cell.set_input("en", false);
    cell.tick();
    assert_eq!(cell.output_value("q"), true);

    cell.set_input("en", true);
    cell.tick();
    assert_eq!(cell.output_value("q"), false);
}

#[test]
fn multi_bit_ports_expand_to_indexed_scalars() {
    let source = "
        circuit Split {
            inputs { x[2] }
            outputs { y[2] }
            gates {
                n0 = NOT()
                n1 = NOT()
            }
            connections {
                x[0] -> n0.in[0]
                x[1] -> n1.in[0]
                n0.out -> y[0]
                n1.out -> y[1]
            }
        }

        circuit Bus {
            inputs { a[2] }
            outputs { z[2] }
            gates { s = Circuit(\"Split\") }
            connections {
                a -> s.in.x
                s.out -> z
            }
        }
    ";
    let mut bus = load(source, "Bus");

    assert_eq!(bus.input_ports().len(), 1);
    assert_eq!(bus.input_ports()[0].name(), "a");
    assert_eq!(bus.input_ports()[0].width(), 2);
    assert!(bus.inputs().contains_key("a[0]"));
    assert!(bus.inputs().contains_key("a[1]"));
    assert!(!bus.inputs().contains_key("a"));

    bus.set_input_bus("a", &[true, false]);
    let report = bus.tick();
    assert!(report.converged);
    assert_eq!(bus.output_bus("z"), vec![false, true]);
}

#[test]
fn lookup_table_hits_and_misses() {
    let mut lut = load(
        "
        circuit Lut {
            inputs { a, b }
            outputs { q[2] }
            lookup_tables {
                add = {
                    00 -> 00
                    01 -> 01
                    10 -> 01
                }
            }
            gates { t = LookupTable(\"add\") }
            connections {
                a -> t.in[0]
                b -> t.in[1]
                t.out -> q
            }
        }
        ",
        "Lut",
    );

    // The query key reads the input vector last input first.
    lut.set_input("a", true);
    lut.set_input("b", false);
    let report = lut.tick();
    assert!(report.table_misses.is_empty());
    assert_eq!(lut.output_bus("q"), vec![true, false]);

    lut.set_input("a", false);
    lut.set_input("b", true);
    lut.tick();
    assert_eq!(lut.output_bus("q"), vec![true, false]);

    // A missing row yields all-false and is reported, not a fault.
    lut.set_input("a", true);
    lut.set_input("b", true);
    let report = lut.tick();
    assert_eq!(lut.output_bus("q"), vec![false, false]);
    assert!(!report.table_misses.is_empty());
    assert_eq!(report.table_misses[0].table, "add");
    assert_eq!(report.table_misses[0].key, "11");

    let miss = lut.tick_strict().unwrap_err();
    assert_eq!(miss.key, "11");
}

#[test]
fn unwired_table_inputs_read_as_false_in_the_key() {
    let mut lut = load(
        "
        circuit Padded {
            inputs { a }
            outputs { q }
            lookup_tables {
                t2 = {
                    00 -> 1
                    10 -> 0
                }
            }
            gates { t = LookupTable(\"t2\") }
            connections {
                a -> t.in[0]
                t.out -> q
            }
        }
        ",
        "Padded",
    );

    // Input slot 1 is never wired: the key is still two characters wide,
    // with the unwired bit reading as 0.
    lut.set_input("a", false);
    let report = lut.tick();
    assert!(report.table_misses.is_empty());
    assert_eq!(lut.output_value("q"), true);

    lut.set_input("a", true);
    let report = lut.tick();
    assert_eq!(lut.output_value("q"), false);
    assert_eq!(report.table_misses[0].key, "01");
}

#[test]
fn unwired_outputs_read_as_false() {
    let circuit = load(
        "
        circuit Open {
            inputs { a }
            outputs { q }
            gates { g = AND() }
            connections { a -> g.in[0] }
        }
        ",
        "Open",
    );
    assert_eq!(circuit.outputs()["q"], None);
    assert_eq!(circuit.output_value("q"), false);
}

#[test]
#[should_panic]
fn poking_an_undeclared_input_panics() {
    let mut circuit = load(
        "
        circuit Empty {
            inputs { a }
        }
        ",
        "Empty",
    );
    circuit.set_input("nope", true);
}

#[test]
fn imports_resolve_against_the_importing_directory() {
    let dir = std::env::temp_dir().join("krets-test-import-basic");
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(dir.join("half_adder.circuit"), HALF_ADDER).unwrap();
    std::fs::write(
        dir.join("main.circuit"),
        format!(
            "import \"half_adder\"\n{}",
            "
            circuit Main {
                inputs { a, b }
                outputs { sum }
                gates { ha = Circuit(\"HalfAdder\") }
                connections {
                    a -> ha.in.a
                    b -> ha.in.b
                    ha.out.sum -> sum
                }
            }
            "
        ),
    )
    .unwrap();

    let mut circuits = load_circuits_from_file(dir.join("main.circuit")).unwrap();
    assert_eq!(circuits["Main"].level(), 0);
    assert_eq!(circuits["HalfAdder"].level(), 1);
    assert!(circuits["HalfAdder"].file().ends_with("half_adder.circuit"));

    let mut main = circuits.remove("Main").unwrap();
    main.set_input("a", true);
    main.set_input("b", false);
    main.tick();
    assert_eq!(main.output_value("sum"), true);
}

#[test]
fn redefinition_is_last_wins() {
    let dir = std::env::temp_dir().join("krets-test-import-override");
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(
        dir.join("lib.circuit"),
        "
        circuit Buf {
            inputs { a }
            outputs { q }
            gates { g = AND() }
            connections {
                a -> g.in[0]
                g.out -> q
            }
        }
        ",
    )
    .unwrap();
    std::fs::write(
        dir.join("main.circuit"),
        "
        import \"lib\"
        circuit Buf {
            inputs { a }
            outputs { q }
            gates { g = NOT() }
            connections {
                a -> g.in[0]
                g.out -> q
            }
        }
        ",
    )
    .unwrap();

    let circuits = load_circuits_from_file(dir.join("main.circuit")).unwrap();
    assert_eq!(circuits["Buf"].gate("g").unwrap().kind().tag(), "NOT");
    assert_eq!(circuits["Buf"].level(), 0);
}

#[test]
fn missing_import_is_an_import_fault() {
    let dir = std::env::temp_dir().join("krets-test-import-missing");
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(dir.join("main.circuit"), "import \"no_such_file\"\n").unwrap();

    match load_circuits_from_file(dir.join("main.circuit")) {
        Err(fault @ Fault::Import(_, _, None)) => {
            assert!(fault.message().contains("no_such_file.circuit"));
        }
        other => panic!("expected an import fault, got {other:?}"),
    }
}

#[test]
fn faults_inside_imports_keep_their_root_cause() {
    let dir = std::env::temp_dir().join("krets-test-import-nested-fault");
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(dir.join("broken.circuit"), "circuit Broken {\n    wat\n}").unwrap();
    std::fs::write(dir.join("main.circuit"), "import \"broken\"\n").unwrap();

    let fault = load_circuits_from_file(dir.join("main.circuit")).unwrap_err();
    match &fault {
        Fault::Import(pos, _, Some(_)) => {
            assert_eq!(*pos, Pos::new(1, 1));
        }
        other => panic!("expected an import fault, got {other:?}"),
    }
    match fault.root_cause() {
        Fault::Syntax(pos, _) => assert_eq!(*pos, Pos::new(2, 5)),
        other => panic!("expected a syntax root cause, got {other:?}"),
    }
}

#[test]
fn fault_taxonomy() {
    let cases: Vec<(&str, fn(&Fault) -> bool)> = vec![
        (
            "circuit C { gates { g = FOO() } }",
            |f| matches!(f, Fault::Gate(_, _)),
        ),
        (
            "circuit C { gates { g = Circuit(\"Nope\") } }",
            |f| matches!(f, Fault::Gate(_, _)),
        ),
        (
            "circuit C { gates { g = LookupTable(\"Nope\") } }",
            |f| matches!(f, Fault::Gate(_, _)),
        ),
        (
            "circuit C { inputs { a } gates { g = AND() } connections { b -> g.in[0] } }",
            |f| matches!(f, Fault::Connection(_, _)),
        ),
        (
            "circuit C { inputs { a } gates { g = NOT() } connections { a -> g.in[1] } }",
            |f| matches!(f, Fault::Connection(_, _)),
        ),
        (
            "circuit C { inputs { a } lookup_tables { t = { 0 -> 1 } } \
             gates { g = LookupTable(\"t\") } connections { a -> g.in[1] } }",
            |f| matches!(f, Fault::Connection(_, _)),
        ),
        (
            "circuit C { inputs { a } outputs { q } connections { a -> q } }",
            |f| matches!(f, Fault::Connection(_, _)),
        ),
        (
            "circuit C { inputs { a[2] } gates { g = Circuit(\"C\") } }",
            |f| matches!(f, Fault::Gate(_, _)),
        ),
        (
            "circuit C { wat { } }",
            |f| matches!(f, Fault::Syntax(_, _)),
        ),
        (
            "wat",
            |f| matches!(f, Fault::Syntax(_, _)),
        ),
        (
            "circuit C { inputs { a } gates { g = AND() } connections { a -> g.in } }",
            |f| matches!(f, Fault::Connection(_, _)),
        ),
    ];

    for (source, is_expected) in cases {
        let fault = parse_circuits_from_string(source).unwrap_err();
        assert!(is_expected(&fault), "source {source:?} raised {fault}");
    }
}

#[test]
fn width_mismatch_is_a_connection_fault() {
    let source = "
        circuit Narrow {
            inputs { x }
            outputs { y }
            gates { n = NOT() }
            connections {
                x -> n.in[0]
                n.out -> y
            }
        }

        circuit Wide {
            inputs { a[2] }
            outputs { z }
            gates { s = Circuit(\"Narrow\") }
            connections {
                a -> s.in.x
            }
        }
    ";
    match parse_circuits_from_string(source) {
        Err(Fault::Connection(_, message)) => assert!(message.contains("width mismatch")),
        other => panic!("expected a connection fault, got {other:?}"),
    }
}

#[test]
fn block_spans_cover_the_source() {
    let circuit = load(
        "circuit Spans {\n    inputs { a }\n    outputs { q }\n}",
        "Spans",
    );
    let inputs = circuit.blocks()["inputs"];
    assert_eq!(inputs.start(), Pos::new(2, 5));
    assert_eq!(inputs.end(), Pos::new(2, 16));
    assert!(circuit.blocks().contains_key("outputs"));
    assert!(!circuit.blocks().contains_key("gates"));
}

#[test]
fn describe_reports_structure_as_json() {
    let source = format!("{HALF_ADDER}\n{FULL_ADDER}");
    let adder = load(&source, "FullAdder");
    let json = describe(&adder);

    assert_eq!(json["name"], "FullAdder");
    assert_eq!(json["level"], 0);
    assert_eq!(json["inputs"].as_array().unwrap().len(), 3);
    assert_eq!(json["outputs"][0]["name"], "sum");
    assert_eq!(json["outputs"][0]["width"], 1);

    let gates = json["gates"].as_array().unwrap();
    let ha1 = gates.iter().find(|g| g["name"] == "ha1").unwrap();
    assert_eq!(ha1["kind"], "Circuit");
    assert!(gates.iter().any(|g| g["kind"] == "OutputSelector"));

    assert!(json["blocks"]["connections"]["start"]["line"].is_number());

    let lut = load(
        "
        circuit Lut {
            inputs { a }
            outputs { q }
            lookup_tables {
                id = { 0 -> 0, 1 -> 1 }
            }
            gates { t = LookupTable(\"id\") }
            connections {
                a -> t.in[0]
                t.out -> q
            }
        }
        ",
        "Lut",
    );
    let json = describe(&lut);
    assert_eq!(json["lookup_tables"][0]["name"], "id");
    assert_eq!(json["lookup_tables"][0]["input_width"], 1);
    assert_eq!(json["lookup_tables"][0]["rows"].as_array().unwrap().len(), 2);
}
