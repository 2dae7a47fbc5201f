mod utils;

use arrow::array::Array;
use cadunico_vuln::reader::{RawTableReader, read_raw_table};
use cadunico_vuln::writer::MemorySink;
use cadunico_vuln::{
    HouseholdSink, SourceLayout, SourceSet, TextEncoding, VulnError, VulnerabilityPipeline,
        detect_format,
};
use utils::{Fixture, benefit_extract, family_extract, person_extract};

#[test]
fn test_semicolon_latin1_family_extract() {
    let fixture = Fixture::new();
    let path = fixture.write_latin1(
        "familia.csv",
        "cd_ibge;cod_familiar_fam;nom_localidade_fam\n2304400;1;São José\n",
    );

    let format = detect_format(&path, 100).unwrap();
    assert_eq!(format.layout, SourceLayout::FamilyRegister);
    assert_eq!(format.delimiter, b';');
    assert_eq!(format.encoding, TextEncoding::Latin1);
}

#[test]
fn test_comma_utf8_sewage_signature_is_recognized() {
    let fixture = Fixture::new();
    let path = fixture.write_utf8(
        "familia.csv",
        "cod_familiar_fam,cod_escoa_sanitario_domic_fam\n10,1\n11,3\n",
    );

    let format = detect_format(&path, 100).unwrap();
    assert_eq!(format.layout, SourceLayout::FamilyRegister);
    assert_eq!(format.delimiter, b',');
    assert_eq!(format.encoding, TextEncoding::Utf8);
}

#[test]
fn test_person_markers_win_over_municipality() {
    let fixture = Fixture::new();
    let path = fixture.write_utf8(
        "pessoa.csv",
        "cd_ibge,cod_familiar_fam,cod_parentesco_rf_pessoa,idade\n3550308,1,1,40\n",
    );
    assert_eq!(detect_format(&path, 100).unwrap().layout, SourceLayout::PersonRegister);
}

#[test]
fn test_tab_separated_benefit_extract() {
    let fixture = Fixture::new();
    let path = fixture.write_utf8(
        "pagamentos.tsv",
        "\"UF\"\t\"NIS FAVORECIDO\"\t\"VALOR PARCELA\"\nSP\t123\t\"150,00\"\n",
    );

    let format = detect_format(&path, 100).unwrap();
    assert_eq!(format.layout, SourceLayout::BenefitPayments);
    assert_eq!(format.delimiter, b'\t');
    assert_eq!(format.columns, vec!["uf", "nis_favorecido", "valor_parcela"]);
}

#[test]
fn test_benefit_signature_needs_both_columns() {
    let fixture = Fixture::new();
    let path = fixture.write_utf8("pagamentos.csv", "uf;nis_favorecido\nSP;1\n");
    assert!(matches!(
        detect_format(&path, 100),
        Err(VulnError::FormatDetection { attempts: 6, .. })
    ));
}

#[test]
fn test_generated_extracts_are_detected() {
    let fixture = Fixture::new();
    let (family, persons, benefits) = fixture.register_extracts(20);

    assert_eq!(detect_format(&family, 100).unwrap().layout, SourceLayout::FamilyRegister);
    assert_eq!(detect_format(&persons, 100).unwrap().layout, SourceLayout::PersonRegister);
    assert_eq!(detect_format(&benefits, 100).unwrap().layout, SourceLayout::BenefitPayments);
}

#[test]
fn test_latin1_text_is_decoded() {
    let fixture = Fixture::new();
    let path = fixture.write_latin1("pessoa.csv", &person_extract(3));

    let (format, batches) = read_raw_table(&path, 100, 1000).unwrap();
    assert_eq!(format.encoding, TextEncoding::Latin1);
    let names = batches[0]
        .column_by_name("nom_pessoa")
        .unwrap()
        .as_any()
        .downcast_ref::<arrow::array::StringArray>()
        .unwrap();
    assert_eq!(names.value(0), "Responsável 0");
}

#[test]
fn test_short_rows_are_padded_with_nulls() {
    let fixture = Fixture::new();
    let path = fixture.write_utf8("familia.csv", "cd_ibge;qtde_pessoas;marc_pbf\n2304400;3\n");

    let format = detect_format(&path, 100).unwrap();
    let batches: Vec<_> = RawTableReader::open(&path, format, 10)
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap();
    assert_eq!(batches[0].num_rows(), 1);
    assert!(batches[0].column(2).is_null(0));
}

#[test]
fn test_sources_must_match_their_role() {
    let fixture = Fixture::new();
    let family = fixture.write_latin1("familia.csv", &family_extract(5));
    let benefits = fixture.write_latin1("pagamentos.csv", &benefit_extract(5));

    let sources = SourceSet::new(&family).with_persons(&benefits);
    let mut sink = MemorySink::new();
    let err = VulnerabilityPipeline::default().run(&sources, &mut sink).unwrap_err();
    assert!(matches!(
        err,
        VulnError::UnexpectedLayout {
            expected: "person register",
            found: "benefit payments",
            ..
        }
    ));
    assert_eq!(sink.rows_written(), 0);
}

#[test]
fn test_undetectable_family_extract_writes_nothing() {
    let fixture = Fixture::new();
    let path = fixture.write_utf8("other.csv", "a,b\n1,2\n");

    let mut sink = MemorySink::new();
    let err = VulnerabilityPipeline::default()
        .run(&SourceSet::new(&path), &mut sink)
        .unwrap_err();
    assert!(matches!(err, VulnError::FormatDetection { .. }));
    assert!(sink.batches().is_empty());
}
