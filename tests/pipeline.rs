use sheet_mapper::master::master_columns;
use sheet_mapper::Collaborator;
use sheet_mapper::FileStage;
use sheet_mapper::MasterAccumulator;
use sheet_mapper::OutputSchema;
use sheet_mapper::Pipeline;
use sheet_mapper::PipelineConfig;
use sheet_mapper::ReadOptions;
use sheet_mapper::Table;
use sheet_mapper::TemplateStore;
use std::collections::VecDeque;
use std::fs;
use std::fs::File;
use std::io::Write;
use std::path::Path;
use tempfile::TempDir;
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

const STORE_HEADER: &str = "Template;Name;Fee;NationalID;MemberNumber;Rate;ContributionMonth";

/// Plays back prepared answers and records what it was asked.
#[derive(Default)]
struct ScriptedCollaborator {
    headers: VecDeque<String>,
    templates: VecDeque<String>,
    aliases: Vec<(String, String)>,
    previews: Vec<(String, Option<String>)>,
    reduced_candidates: Vec<(String, String)>,
}

impl ScriptedCollaborator {
    fn file(mut self, header: &str, template_id: &str) -> Self {
        self.headers.push_back(header.to_owned());
        self.templates.push_back(template_id.to_owned());
        self
    }

    fn alias(mut self, column: &str, alias: &str) -> Self {
        self.aliases.push((column.to_owned(), alias.to_owned()));
        self
    }
}

impl Collaborator for ScriptedCollaborator {
    fn guess_header_row(&mut self, preview: &str, sheet_name: Option<&str>) -> anyhow::Result<String> {
        self.previews.push((preview.to_owned(), sheet_name.map(str::to_owned)));
        self.headers.pop_front().ok_or_else(|| anyhow::anyhow!("no header answer left"))
    }

    fn choose_template(&mut self, _header_row: &str, candidates: &[String]) -> anyhow::Result<String> {
        let id = self.templates.pop_front().ok_or_else(|| anyhow::anyhow!("no template answer left"))?;
        let candidate = candidates
            .iter()
            .find(|candidate| candidate.starts_with(&format!("\"{id}\"")))
            .ok_or_else(|| anyhow::anyhow!("template {id} was not offered"))?;
        Ok(format!("{STORE_HEADER}: {candidate}"))
    }

    fn suggest_alias(&mut self, output_column: &str, reduced_candidate: &str) -> anyhow::Result<String> {
        self.reduced_candidates.push((output_column.to_owned(), reduced_candidate.to_owned()));
        Ok(self
            .aliases
            .iter()
            .find(|(column, _)| column == output_column)
            .map(|(_, alias)| alias.to_owned())
            .unwrap_or_default())
    }
}

fn write_store(directory: &Path) -> TemplateStore {
    let path = directory.join("templates.csv");
    let text = format!("{STORE_HEADER}\nFP;Nome;Valor;NIF;;;\nSAMS;Sócio;Quota;Contribuinte;Nº Sócio;Taxa;Mês\n");
    fs::write(&path, text).unwrap();
    TemplateStore::load(&path, &ReadOptions::default()).unwrap()
}

/// A one-sheet workbook using shared strings and a date style.
fn write_february_workbook(path: &Path) {
    let mut zip = ZipWriter::new(File::create(path).unwrap());
    let options = SimpleFileOptions::default();
    let parts = [
        ("xl/workbook.xml", r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<workbook xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships"><sheets><sheet name="Folha1" sheetId="1" r:id="rId1"/></sheets></workbook>"#),
        ("xl/_rels/workbook.xml.rels", r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet1.xml"/></Relationships>"#),
        ("xl/styles.xml", r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<styleSheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><cellXfs count="2"><xf numFmtId="0"/><xf numFmtId="14"/></cellXfs></styleSheet>"#),
        ("xl/sharedStrings.xml", r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<sst xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><si><t>Quotas Fevereiro</t></si><si><t>Sócio</t></si><si><t>Quota</t></si><si><t>Contribuinte</t></si><si><t>Nº Sócio</t></si><si><t>Mês</t></si><si><t>Eva Lopes </t></si><si><t>Luís Melo</t></si></sst>"#),
        ("xl/worksheets/sheet1.xml", r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><sheetData>
<row r="1"><c r="A1" t="s"><v>0</v></c></row>
<row r="3"><c r="A3" t="s"><v>1</v></c><c r="B3" t="s"><v>2</v></c><c r="C3" t="s"><v>3</v></c><c r="D3" t="s"><v>4</v></c><c r="E3" t="s"><v>5</v></c></row>
<row r="4"><c r="A4" t="s"><v>6</v></c><c r="B4"><v>5</v></c><c r="C4"><v>111</v></c><c r="D4"><v>42</v></c><c r="E4" s="1"><v>45352</v></c></row>
<row r="5"><c r="A5" t="s"><v>7</v></c><c r="B5"><v>5.5</v></c><c r="C5"><v>222</v></c><c r="D5"><v>43</v></c><c r="E5" s="1"><v>45352</v></c></row>
</sheetData></worksheet>"#),
    ];
    for (name, content) in parts {
        zip.start_file(name, options).unwrap();
        zip.write_all(content.as_bytes()).unwrap();
    }
    zip.finish().unwrap();
}

fn column<'a>(table: &'a Table, name: &str) -> Vec<&'a str> {
    (0..table.len()).map(|row| table.value(row, name).unwrap()).collect()
}

#[test]
fn batch_accumulates_standardized_rows() {
    let directory = TempDir::new().unwrap();
    let root = directory.path();
    let store = write_store(root);

    let january = root.join("january.csv");
    fs::write(&january, "\u{feff}Relatório de Quotas;;;;\n;;;;\nNome;Valor;NIF;Mês Ref;Observações\n\
        Ana Silva;12.0;123456789;2024-01;\nRui Costa;7.50;987654321;2024-01;ok\nTotal;19.5;;;\n").unwrap();
    let february = root.join("february.xlsx");
    write_february_workbook(&february);
    let march = root.join("march.csv");
    fs::write(&march, "Name;Amount\nAna;1\n").unwrap();
    let april = root.join("april.csv");
    fs::write(&april, "Nome;Valor;NIF\nAna;;\n;3;\n").unwrap();

    let master_path = root.join("out").join("master.xlsx");
    fs::create_dir(root.join("out")).unwrap();
    let pipeline = Pipeline::new(PipelineConfig::default(), store, &master_path).unwrap();

    let mut collaborator = ScriptedCollaborator::default()
        .file("Nome;Valor;NIF;Mês Ref;Observações;", "FP")
        .file("Sócio;Quota;Contribuinte;Nº Sócio;Mês;Folha1", "SAMS")
        .file("Nome;Valor;Folha1", "FP")
        .file("Nome;Valor;NIF;", "FP")
        .alias("ContributionMonth", " \"mês ref\" ");
    let inputs = vec![january, february, march, april];
    let summary = pipeline.run_batch(&inputs, &mut collaborator);

    assert_eq!(summary.files_able_to_extract_data, vec!["january.csv", "february.xlsx"]);
    assert_eq!(summary.files_unable_to_extract_data, vec!["march.csv", "april.csv"]);
    let stages: Vec<FileStage> = summary.outcomes.iter().map(|outcome| outcome.stage).collect();
    assert_eq!(stages, vec![
        FileStage::Accumulated,
        FileStage::Accumulated,
        FileStage::HeaderNotFound,
        FileStage::NoRowsExtracted,
    ]);
    assert_eq!(summary.outcomes[0].header_row_index, Some(2));
    assert_eq!(summary.outcomes[1].header_row_index, Some(2));
    assert_eq!(summary.outcomes[1].template_id.as_deref(), Some("SAMS"));
    assert_eq!(summary.outcomes[0].rows_extracted, 2);

    // the workbook preview carries its sheet name; delimited files have none
    assert_eq!(collaborator.previews[0].1, None);
    assert_eq!(collaborator.previews[1].1.as_deref(), Some("Folha1"));
    assert!(collaborator.previews[0].0.starts_with("Relatório de Quotas;;;;\n"));

    // the alias prompt only shows columns the template did not already use
    let (asked, reduced) = &collaborator.reduced_candidates[0];
    assert_eq!(asked, "MemberNumber");
    assert!(reduced.starts_with("\"Mês Ref\";\"Observações\"\n"));
    assert!(!reduced.contains("Nome"));

    let columns = master_columns(&OutputSchema::default().names(), true);
    let master = MasterAccumulator::open(&master_path, columns.to_owned(), ';').unwrap().read().unwrap();
    assert_eq!(master.columns(), columns.as_slice());
    assert_eq!(column(&master, "Name"), vec!["Ana Silva", "Rui Costa", "Eva Lopes", "Luís Melo"]);
    assert_eq!(column(&master, "Fee"), vec!["12", "7.50", "5", "5.5"]);
    assert_eq!(column(&master, "MemberNumber"), vec!["", "", "42", "43"]);
    assert_eq!(column(&master, "ContributionMonth"), vec!["2024-01", "2024-01", "2024-03-01", "2024-03-01"]);
    assert_eq!(column(&master, "SourceFile"), vec!["january.csv", "", "february.xlsx", ""]);

    let provenance = column(&master, "MappingTemplateUsed");
    assert_eq!(provenance[1], "");
    assert_eq!(provenance[3], "");
    let january_mapping: serde_json::Value = serde_json::from_str(provenance[0]).unwrap();
    assert_eq!(january_mapping["ContributionMonth"], "Mês Ref");
    assert_eq!(january_mapping["Rate"], "");
    let february_mapping: serde_json::Value = serde_json::from_str(provenance[2]).unwrap();
    assert_eq!(february_mapping["Name"], "Sócio");
    assert_eq!(february_mapping["Rate"], "");
}

#[test]
fn rerun_appends_after_previous_results() {
    let directory = TempDir::new().unwrap();
    let root = directory.path();
    let input = root.join("may.csv");
    fs::write(&input, "Nome;Valor;NIF\nAna;1;2\n").unwrap();
    let master_path = root.join("master.csv");

    for _ in 0..2 {
        let pipeline = Pipeline::new(PipelineConfig::default(), write_store(root), &master_path).unwrap();
        let mut collaborator = ScriptedCollaborator::default().file("Nome;Valor;NIF;", "FP");
        let summary = pipeline.run_batch(&[input.to_owned()], &mut collaborator);
        assert_eq!(summary.files_able_to_extract_data, vec!["may.csv"]);
    }
    let master = MasterAccumulator::open(&master_path, Vec::new(), ';').unwrap().read().unwrap();
    assert_eq!(column(&master, "Name"), vec!["Ana", "Ana"]);

    let config = PipelineConfig { reset_master: true, ..PipelineConfig::default() };
    Pipeline::new(config, write_store(root), &master_path).unwrap();
    let master = MasterAccumulator::open(&master_path, Vec::new(), ';').unwrap().read().unwrap();
    assert!(master.is_empty());
}
