use mockito::{Matcher, Server};
use serde_json::json;
use tempfile::tempdir;

use super::*;
use crate::{
  config::Settings,
  database::{ArticleFilter, Database},
  harvest::Harvester,
};

const FIXTURE: &str =
  include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/tests/fixtures/list_records.xml"));

const SCHEMA_LOCATION: &str =
  "http://www.openarchives.org/OAI/2.0/oai_dc/ http://www.openarchives.org/OAI/2.0/oai_dc.xsd";

#[test]
fn test_fixture_normalizes_with_source_shapes() {
  let records = normalize::normalize(Envelope::parse(FIXTURE).unwrap().into_records());
  assert_eq!(records.len(), 2);

  let first = serde_json::to_value(&records[0]).unwrap();
  assert_eq!(
    first,
    json!({
      "header": {
        "identifier": "oai:arXiv.org:0802.3300",
        "datestamp": "2024-01-18",
        "setSpec": "cs"
      },
      "metadata": {
        "oai_dc:dc": {
          "@xsi:schemaLocation": SCHEMA_LOCATION,
          "dc:title": "Projective Expected Utility",
          "dc:creator": "La Mura, Pierfrancesco",
          "dc:subject": [
            "Quantum Physics",
            "Computer Science - Computer Science and Game Theory",
            "Economics - Theoretical Economics"
          ],
          "dc:description": [
            "Motivated by several classic decision-theoretic paradoxes, and by analogies with the paradoxes which in physics motivated the development of quantum mechanics, we introduce a projective generalization of expected utility along the lines of the quantum-mechanical generalization of probability theory. The resulting decision theory accommodates the dominant paradoxes, while retaining significant simplicity and tractability. In particular, every finite game within this larger class of preferences still has an equilibrium.",
            "Comment: 7 pages, to appear in the Proceedings of Quantum Interaction 2008"
          ],
          "dc:date": "2008-02-22",
          "dc:type": "text",
          "dc:identifier": [
            "http://arxiv.org/abs/0802.3300",
            "J. of Math. Psychology, 53:5 (2009)",
            "doi:10.1016/j.jmp.2009.02.001"
          ]
        }
      }
    })
  );

  let second = &records[1];
  assert_eq!(second.header.identifier, "oai:arXiv.org:0803.0966");
  assert_eq!(second.header.datestamp, NaiveDate::from_ymd_opt(2024, 1, 1).unwrap());
  assert_eq!(
    second.metadata.title(),
    Some(&Field::One("New probabilistic interest measures for association rules".into()))
  );
  assert_eq!(
    second.metadata.creators(),
    Some(&Field::Many(vec!["Hahsler, Michael".into(), "Hornik, Kurt".into()]))
  );
  assert_eq!(
    second.metadata.subjects(),
    Some(&Field::Many(vec![
      "Computer Science - Databases".into(),
      "Statistics - Machine Learning".into()
    ]))
  );
  assert!(matches!(second.metadata.descriptions(), Some(Field::One(text)) if text.starts_with("Mining association rules")));
  assert_eq!(
    second.metadata.identifiers().map(Field::values),
    Some(vec![
      "http://arxiv.org/abs/0803.0966",
      "Intelligent Data Analysis, 11(5):437-455, 2007",
      "doi:10.3233/IDA-2007-11502"
    ])
  );
}

#[traced_test]
#[tokio::test]
async fn test_harvest_fixture_into_database() -> anyhow::Result<()> {
  let mut server = Server::new_async().await;
  let mock = server
    .mock("GET", "/oai2")
    .match_query(Matcher::AllOf(vec![
      Matcher::UrlEncoded("verb".into(), "ListRecords".into()),
      Matcher::UrlEncoded("metadataPrefix".into(), "oai_dc".into()),
      Matcher::UrlEncoded("set".into(), "cs".into()),
      Matcher::UrlEncoded("until".into(), "2024-01-29".into()),
    ]))
    .with_status(200)
    .with_header("content-type", "text/xml")
    .with_body(FIXTURE)
    .expect(1)
    .create_async()
    .await;

  let settings: Settings = [
    (config::HOST_KEY, format!("{}/oai2", server.url())),
    (config::SET_KEY, "cs".to_string()),
    (config::CHECK_INTERVAL_KEY, "120".to_string()),
    (config::TIMEOUT_KEY, "5".to_string()),
  ]
  .into_iter()
  .collect();
  let harvester = Harvester::new(HarvestConfig::from_settings(&settings)?);

  let dir = tempdir()?;
  let db = Database::open(dir.path().join("records.db")).await?;
  let summary = harvester.run_cycle(&db, NaiveDate::from_ymd_opt(2024, 1, 29), None).await?;

  assert_eq!((summary.harvested, summary.discarded, summary.inserted), (2, 0, 2));
  mock.assert_async().await;
  assert!(logs_contain("Inserted 2 records"));

  let january = ArticleFilter {
    start_date: NaiveDate::from_ymd_opt(2024, 1, 10),
    end_date: NaiveDate::from_ymd_opt(2024, 1, 31),
    ..ArticleFilter::default()
  };
  let found = db.find_documents(&january, 1).await?;
  assert_eq!(found.len(), 1);
  assert_eq!(found[0]["header"]["identifier"], "oai:arXiv.org:0802.3300");

  let association =
    ArticleFilter { title: Some("ASSOCIATION rules".into()), ..ArticleFilter::default() };
  let found = db.find_documents(&association, 1).await?;
  assert_eq!(found.len(), 1);
  assert_eq!(found[0]["header"]["datestamp"], "2024-01-01");

  db.close().await?;
  Ok(())
}
