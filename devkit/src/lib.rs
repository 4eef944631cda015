/*!
# Camera Observer DevKit - Doubles de test

Bibliothèque facilitant les tests du service sans broker ni compte SmartThings:
- Feed de télémétrie simulé (remplace le TelemetrySubscriber)
- Controller enregistreur (remplace l'API SmartThings)
- Builder de messages `frigate/stats`
- Harness assemblant un FaultObserver complet
*/

pub mod controller_stub;
pub mod telemetry_stub;
pub mod test_utils;

pub use controller_stub::{RecordingController, SentCommand};
pub use telemetry_stub::{MockTelemetryFeed, StatsMessageBuilder};
pub use test_utils::{ObserverHarness, STATS_TOPIC};
