use serde_json::json;

use super::*;

fn build(documents: Value, config: &Config) -> Conversion {
    let documents = match documents {
        Value::Array(items) => items,
        other => vec![other],
    };
    build_workbook(documents, config).expect("workbook assembled")
}

fn text(value: &str) -> CellValue {
    CellValue::from(value)
}

#[test]
fn object_id_and_nested_items_scenario() {
    let conversion = build(
        json!({"_id": {"$oid": "abc123"}, "questoes": [{"q": 1}, {"q": 2}]}),
        &Config::default(),
    );
    let workbook = &conversion.workbook;

    let main = workbook.table(MAIN_SHEET).expect("main sheet");
    assert_eq!(main.rows.len(), 1);
    assert_eq!(main.cell(0, "_id"), Some(&text("abc123")));
    assert_eq!(main.cell(0, "questoes_count"), Some(&CellValue::from(2usize)));
    assert!(main.column_index("questoes").is_none());

    let items = workbook.table(ITEMS_SHEET).expect("items sheet");
    assert_eq!(items.rows.len(), 2);
    assert_eq!(items.columns[0], "_id");
    assert_eq!(items.columns[1], ITEM_NUMBER_COLUMN);
    for (row, q) in [(0, 1usize), (1, 2)] {
        assert_eq!(items.cell(row, "_id"), Some(&text("abc123")));
        assert_eq!(items.cell(row, "q"), Some(&CellValue::from(q)));
    }

    assert_eq!(conversion.records, 1);
    assert_eq!(conversion.items, 2);
    assert!(conversion.warnings.is_empty());
}

#[test]
fn sheets_follow_the_fixed_order() {
    let config = Config {
        stats_dimensions: vec![vec!["status".into()], vec!["region".into(), "status".into()]],
        expanded_items_key: Some("respostas".into()),
        ..Config::default()
    };
    let conversion = build(json!([{"status": "ok"}]), &config);

    assert_eq!(
        conversion.workbook.sheet_names(),
        vec![
            MAIN_SHEET,
            ITEMS_SHEET,
            RAW_SHEET,
            "Stats - status",
            "Stats - region, status",
            NORMALIZED_SHEET,
            EXPANDED_SHEET,
        ]
    );
}

#[test]
fn empty_input_still_produces_every_sheet() {
    let config = Config {
        stats_dimensions: vec![vec!["status".into()]],
        numeric_fields: vec!["total".into()],
        ..Config::default()
    };
    let conversion = build_workbook(Vec::new(), &config).expect("empty workbook");
    let workbook = &conversion.workbook;

    assert_eq!(workbook.tables.len(), 5);
    assert!(workbook.tables.iter().all(|table| table.rows.is_empty()));

    assert!(workbook.table(MAIN_SHEET).unwrap().columns.is_empty());
    assert_eq!(
        workbook.table(RAW_SHEET).unwrap().columns,
        vec![RECORD_NUMBER_COLUMN, RECORD_ID_COLUMN, JSON_COLUMN]
    );
    assert_eq!(
        workbook.table("Stats - status").unwrap().columns,
        vec!["status", COUNT_COLUMN, "total_sum", "total_mean"]
    );
}

#[test]
fn audit_block_is_merged_with_readable_names() {
    let conversion = build(
        json!({
            "_id": "r1",
            "aluno_nome": "already here",
            "auditoria": {
                "aluno": {"nome": "Maria"},
                "turma": {"ano": 5, "turno": "manha"}
            }
        }),
        &Config::default(),
    );
    let main = conversion.workbook.table(MAIN_SHEET).unwrap();

    assert_eq!(main.cell(0, "turma_ano"), Some(&CellValue::from(5usize)));
    assert_eq!(main.cell(0, "turma_turno"), Some(&text("manha")));
    assert_eq!(main.cell(0, "aluno_nome"), Some(&text("already here")));
    assert_eq!(main.cell(0, "auditoria.aluno.nome"), Some(&text("Maria")));

    let normalized = conversion.workbook.table(NORMALIZED_SHEET).unwrap();
    assert_eq!(normalized.cell(0, "auditoria.turma.ano"), Some(&CellValue::from(5usize)));
}

#[test]
fn normalized_sheet_keeps_nested_arrays() {
    let conversion = build(
        json!({"_id": "r1", "questoes": [{"q": 1}, {"q": 2}], "tags": ["a", "b"]}),
        &Config::default(),
    );
    let normalized = conversion.workbook.table(NORMALIZED_SHEET).unwrap();

    assert_eq!(normalized.cell(0, "questoes.0.q"), Some(&CellValue::from(1usize)));
    assert_eq!(normalized.cell(0, "questoes.1.q"), Some(&CellValue::from(2usize)));
    assert_eq!(normalized.cell(0, "tags"), Some(&text("a, b")));
}

#[test]
fn generated_columns_do_not_overwrite_source_fields() {
    let conversion = build(
        json!({
            "_id": "r1",
            "questoes_count": "source",
            "questoes": [{"item_number": "A-7", "q": 1}]
        }),
        &Config::default(),
    );

    let main = conversion.workbook.table(MAIN_SHEET).unwrap();
    assert_eq!(main.cell(0, "questoes_count"), Some(&text("source")));
    assert_eq!(main.cell(0, "_questoes_count"), Some(&CellValue::from(1usize)));

    let items = conversion.workbook.table(ITEMS_SHEET).unwrap();
    assert_eq!(items.cell(0, ITEM_NUMBER_COLUMN), Some(&text("A-7")));
    assert_eq!(items.cell(0, "_item_number"), Some(&CellValue::from(1usize)));
    assert_eq!(items.cell(0, "questoes_count"), Some(&text("source")));
}

#[test]
fn item_totals_sum_array_lengths_across_items() {
    let config = Config {
        item_totals: vec!["categoriasEscolhidas".into()],
        ..Config::default()
    };
    let conversion = build(
        json!([
            {
                "_id": "r1",
                "questoes": [
                    {"categoriasEscolhidas": ["a", "b"]},
                    {"categoriasEscolhidas": []},
                    {"categoriasEscolhidas": "not a list"},
                    {"categoriasEscolhidas": [{"id": 1}, {"id": 2}, {"id": 3}]}
                ]
            },
            {"_id": "r2", "questoes": []},
            {"_id": "r3"}
        ]),
        &config,
    );
    let main = conversion.workbook.table(MAIN_SHEET).unwrap();

    assert_eq!(main.cell(0, "total_categoriasEscolhidas"), Some(&CellValue::from(5usize)));
    assert_eq!(main.cell(1, "total_categoriasEscolhidas"), Some(&CellValue::from(0usize)));
    assert_eq!(main.cell(2, "total_categoriasEscolhidas"), Some(&CellValue::Null));
}

#[test]
fn missing_dimension_lands_in_unknown_group() {
    let config = Config {
        stats_dimensions: vec![vec!["status".into()]],
        ..Config::default()
    };
    let conversion = build(
        json!([{"status": "ok"}, {"status": "ok"}, {"other": 1}]),
        &config,
    );
    let stats = conversion.workbook.table("Stats - status").unwrap();

    assert_eq!(stats.rows.len(), 2);
    assert_eq!(stats.cell(0, "status"), Some(&text("ok")));
    assert_eq!(stats.cell(0, COUNT_COLUMN), Some(&CellValue::from(2usize)));
    assert_eq!(stats.cell(1, "status"), Some(&text(crate::aggregate::UNKNOWN_GROUP)));
    assert_eq!(stats.cell(1, COUNT_COLUMN), Some(&CellValue::from(1usize)));
}

#[test]
fn stats_can_be_computed_over_items() {
    let config = Config {
        stats_dimensions: vec![vec!["questaoTipo".into()]],
        stats_source: StatsSource::Items,
        numeric_fields: vec!["nota".into()],
        ..Config::default()
    };
    let conversion = build(
        json!([
            {"questoes": [{"questaoTipo": "A", "nota": 2}, {"questaoTipo": "B", "nota": 1}]},
            {"questoes": [{"questaoTipo": "A", "nota": 4}]}
        ]),
        &config,
    );
    let stats = conversion.workbook.table("Stats - questaoTipo").unwrap();

    assert_eq!(stats.cell(0, "questaoTipo"), Some(&text("A")));
    assert_eq!(stats.cell(0, COUNT_COLUMN), Some(&CellValue::from(2usize)));
    assert_eq!(stats.cell(0, "nota_sum"), Some(&CellValue::from(6.0)));
    assert_eq!(stats.cell(0, "nota_mean"), Some(&CellValue::from(3.0)));
}

#[test]
fn non_object_records_are_skipped_with_a_warning() {
    let conversion = build(json!([{"_id": "a"}, 42, {"_id": "b"}]), &Config::default());

    assert_eq!(conversion.records, 2);
    assert_eq!(conversion.warnings.len(), 1);
    assert_eq!(conversion.warnings[0].record, 2);
    assert!(conversion.warnings[0].to_string().contains("number"));

    let raw = conversion.workbook.table(RAW_SHEET).unwrap();
    assert_eq!(raw.cell(1, RECORD_NUMBER_COLUMN), Some(&CellValue::from(3usize)));
    assert_eq!(raw.cell(1, RECORD_ID_COLUMN), Some(&text("b")));
}

#[test]
fn nested_key_holding_a_scalar_is_reported_and_kept() {
    let conversion = build(json!({"_id": "a", "questoes": "none"}), &Config::default());

    assert_eq!(conversion.items, 0);
    assert_eq!(conversion.warnings.len(), 1);
    let main = conversion.workbook.table(MAIN_SHEET).unwrap();
    assert_eq!(main.cell(0, "questoes"), Some(&text("none")));
}

#[test]
fn raw_sheet_keeps_the_source_json() {
    let source = json!({"_id": {"$oid": "abc"}, "n": 1});
    let conversion = build(source.clone(), &Config::default());
    let raw = conversion.workbook.table(RAW_SHEET).unwrap();

    assert_eq!(raw.cell(0, RECORD_ID_COLUMN), Some(&text("abc")));
    let Some(CellValue::String(json_text)) = raw.cell(0, JSON_COLUMN) else {
        panic!("json column holds text");
    };
    let parsed: Value = serde_json::from_str(json_text).unwrap();
    assert_eq!(parsed, source);
}

#[test]
fn date_fields_are_converted_on_every_sheet() {
    let conversion = build(
        json!({"createdAt": {"$date": "2025-01-15T10:30:00Z"}, "updatedAt": "2025-01-16", "questoes": [{"q": 1}]}),
        &Config::default(),
    );
    let main = conversion.workbook.table(MAIN_SHEET).unwrap();
    let items = conversion.workbook.table(ITEMS_SHEET).unwrap();

    assert!(matches!(main.cell(0, "createdAt"), Some(CellValue::DateTime(_))));
    assert!(matches!(main.cell(0, "updatedAt"), Some(CellValue::DateTime(_))));
    assert!(matches!(items.cell(0, "updatedAt"), Some(CellValue::DateTime(_))));
}

#[test]
fn chunked_and_whole_runs_agree() {
    let documents: Vec<Value> = (0..7)
        .map(|index| json!({"_id": format!("r{index}"), "questoes": vec![json!({"q": index}); index % 3]}))
        .collect();
    let whole = build_workbook(documents.clone(), &Config::default()).unwrap();
    let chunked = build_workbook(
        documents,
        &Config {
            chunk_size: Some(2),
            ..Config::default()
        },
    )
    .unwrap();

    assert_eq!(whole, chunked);
    assert_eq!(whole.items, (0..7).map(|index| index % 3).sum::<usize>());
}

#[test]
fn every_leaf_value_reaches_a_sheet() {
    let source = json!({
        "_id": {"$oid": "x1"},
        "auditoria": {"aluno": {"nome": "Leaf A"}},
        "questoes": [{"resposta": "Leaf B", "extra": {"deep": "Leaf C"}}],
        "tags": ["Leaf D"],
        "matrix": [[{"v": "Leaf E"}]]
    });
    let conversion = build(source, &Config::default());

    let all_text: Vec<String> = conversion
        .workbook
        .tables
        .iter()
        .filter(|table| table.sheet_name != RAW_SHEET)
        .flat_map(|table| table.rows.iter().flatten().map(CellValue::to_string))
        .collect();

    for leaf in ["x1", "Leaf A", "Leaf B", "Leaf C", "Leaf D", "Leaf E"] {
        assert!(all_text.iter().any(|cell| cell.contains(leaf)), "{leaf} missing");
    }
}

#[test]
fn sheet_names_are_sanitized_and_unique() {
    let mut registry = SheetNameRegistry::default();
    registry.claim(MAIN_SHEET);

    assert_eq!(registry.assign("main data"), "main data_1");
    assert_eq!(registry.assign("a/b:c"), "a_b_c");
    let long = registry.assign("Stats - questão, alternativa, resposta");
    assert_eq!(long.chars().count(), 31);
    let again = registry.assign("Stats - questão, alternativa, resposta");
    assert_eq!(again.chars().count(), 31);
    assert!(again.ends_with("_1"));
}
