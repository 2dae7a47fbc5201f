//! Shared fixtures for the integration tests
//!
//! Register extracts are generated as text with a deterministic layout so
//! tests can predict join and benefit counts.
#![allow(dead_code)]

use std::fmt::Write;
use std::path::PathBuf;

use arrow::record_batch::RecordBatch;
use tempfile::TempDir;

/// IBGE codes the generated households are spread over
pub const MUNICIPALITIES: [i64; 3] = [3550308, 2304400, 5300108];

/// Header of a semicolon-separated family extract
pub const FAMILY_HEADER: &str = "id_familia;cd_ibge;vlr_renda_media_fam;qtde_pessoas;\
cod_material_domic_fam;cod_abaste_agua_domic_fam;cod_escoa_sanitario_domic_fam;\
cod_iluminacao_domic_fam;cod_destino_lixo_domic_fam;marc_pbf";

/// Header of a semicolon-separated person extract
pub const PERSON_HEADER: &str = "id_familia;cod_parentesco_rf_pessoa;num_nis_pessoa_atual;\
nom_pessoa;idade;cod_sexo_pessoa;cod_curso_frequentou_pessoa_memb;cod_trabalhou_memb;\
cod_deficiencia_memb";

/// Header of a semicolon-separated payment extract
pub const BENEFIT_HEADER: &str = "UF;NIS FAVORECIDO;VALOR PARCELA";

/// Temporary directory holding the files of one test
pub struct Fixture {
    dir: TempDir,
}

impl Fixture {
    pub fn new() -> Self {
        Self {
            dir: tempfile::tempdir().expect("failed to create temp dir"),
        }
    }

    /// Path of a file inside the fixture directory
    pub fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    /// Write raw bytes
    pub fn write_bytes(&self, name: &str, bytes: &[u8]) -> PathBuf {
        let path = self.path(name);
        std::fs::write(&path, bytes).expect("failed to write fixture");
        path
    }

    /// Write text as UTF-8
    pub fn write_utf8(&self, name: &str, text: &str) -> PathBuf {
        self.write_bytes(name, text.as_bytes())
    }

    /// Write text as Latin-1, the encoding of the government extracts
    pub fn write_latin1(&self, name: &str, text: &str) -> PathBuf {
        let (bytes, _, unmappable) = encoding_rs::WINDOWS_1252.encode(text);
        assert!(!unmappable, "fixture text is not Latin-1");
        self.write_bytes(name, &bytes)
    }

    /// Family, person and payment extracts for `households` households
    pub fn register_extracts(&self, households: usize) -> (PathBuf, PathBuf, PathBuf) {
        (
            self.write_latin1("familia.csv", &family_extract(households)),
            self.write_latin1("pessoa.csv", &person_extract(households)),
            self.write_latin1("pagamentos.csv", &benefit_extract(households)),
        )
    }
}

fn decimal_comma(value: f64) -> String {
    format!("{value:.2}").replace('.', ",")
}

/// Household income of household `i`
pub fn household_income(i: usize) -> f64 {
    (i * 337 % 2400) as f64 + 0.5
}

/// Number of people of household `i`
pub fn household_size(i: usize) -> usize {
    i % 7 + 1
}

/// Whether household `i` has a reference person in the person extract
pub fn has_reference_person(i: usize) -> bool {
    i % 10 != 9
}

/// NIS of the reference person of household `i`
pub fn reference_nis(i: usize) -> u64 {
    12_000_000_000 + i as u64
}

/// Instalments paid to household `i`
pub fn instalments(i: usize) -> Vec<f64> {
    match i % 6 {
        0 => vec![150.0, 89.5],
        3 => vec![212.25],
        _ => Vec::new(),
    }
}

/// Family extract with zero-padded identifiers
pub fn family_extract(households: usize) -> String {
    let mut text = format!("{FAMILY_HEADER}\n");
    for i in 0..households {
        let _ = writeln!(
            text,
            "{:08};{};{};{};{};{};{};1;{};{}",
            i + 1,
            MUNICIPALITIES[i % MUNICIPALITIES.len()],
            decimal_comma(household_income(i)),
            household_size(i),
            i % 8 + 1,
            if i % 4 == 0 { 2 } else { 1 },
            i % 3 + 1,
            if i % 5 == 0 { 2 } else { 1 },
            i % 2
        );
    }
    text
}

/// Person extract with a reference person and one child per household,
/// identifiers written without padding
pub fn person_extract(households: usize) -> String {
    let mut text = format!("{PERSON_HEADER}\n");
    for i in 0..households {
        if has_reference_person(i) {
            let _ = writeln!(
                text,
                "{};1;{};Responsável {i};{};{};{};{};{}",
                i + 1,
                reference_nis(i),
                15 + i * 7 % 70,
                i % 2 + 1,
                i % 8 + 1,
                i % 2 + 1,
                if i % 6 == 0 { 1 } else { 2 }
            );
        }
        let _ = writeln!(text, "{};3;;Filho {i};{};1;1;2;2", i + 1, i % 12);
    }
    text
}

/// Payment extract listing the instalments of every paid household
pub fn benefit_extract(households: usize) -> String {
    let mut text = format!("{BENEFIT_HEADER}\n");
    for i in 0..households {
        for amount in instalments(i) {
            let _ = writeln!(text, "SP;{};{}", reference_nis(i), decimal_comma(amount));
        }
    }
    text
}

/// Total rows over batches
pub fn total_rows(batches: &[RecordBatch]) -> usize {
    batches.iter().map(RecordBatch::num_rows).sum()
}

/// Concatenate batches with a common schema
pub fn concat(batches: &[RecordBatch]) -> RecordBatch {
    let schema = batches.first().expect("no batches").schema();
    arrow::compute::concat_batches(&schema, batches).expect("failed to concatenate")
}
