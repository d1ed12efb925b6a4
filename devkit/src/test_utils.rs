/*!
Utilitaires de test pour l'agent et le hub SoilSense

- Capture des événements tracing (compte des erreurs/avertissements émis)
- Horloge enregistreuse (aucun sommeil réel, trace des durées demandées)
- Port local garanti fermé pour simuler un backend injoignable
- Serveur local qui raccroche aussitôt pour simuler une connexion coupée
*/

use std::net::TcpListener;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;
use tracing::subscriber::DefaultGuard;
use tracing::{Level, Subscriber};
use tracing_subscriber::layer::{Context, Layer, SubscriberExt};

/// Layer tracing qui compte les événements ERROR et WARN
#[derive(Clone, Default)]
pub struct LogCapture {
    errors: Arc<AtomicUsize>,
    warnings: Arc<AtomicUsize>,
}

impl LogCapture {
    /// Installe la capture comme subscriber par défaut du thread courant.
    ///
    /// La capture reste active tant que le guard retourné est vivant; avec
    /// `#[tokio::test]` (runtime current-thread) cela couvre tout le test.
    pub fn install() -> (Self, DefaultGuard) {
        let capture = Self::default();
        let subscriber = tracing_subscriber::registry().with(capture.clone());
        let guard = tracing::subscriber::set_default(subscriber);
        (capture, guard)
    }

    pub fn errors(&self) -> usize {
        self.errors.load(Ordering::SeqCst)
    }

    pub fn warnings(&self) -> usize {
        self.warnings.load(Ordering::SeqCst)
    }
}

impl<S: Subscriber> Layer<S> for LogCapture {
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
        match *event.metadata().level() {
            Level::ERROR => {
                self.errors.fetch_add(1, Ordering::SeqCst);
            }
            Level::WARN => {
                self.warnings.fetch_add(1, Ordering::SeqCst);
            }
            _ => {}
        }
    }
}

/// Horloge de test: enregistre chaque sommeil demandé sans attendre
#[derive(Clone, Default)]
pub struct RecordingClock {
    sleeps: Arc<Mutex<Vec<Duration>>>,
}

impl RecordingClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, duration: Duration) {
        self.sleeps.lock().unwrap().push(duration);
    }

    /// Durées demandées, dans l'ordre
    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.lock().unwrap().clone()
    }

    pub fn sleep_count(&self) -> usize {
        self.sleeps.lock().unwrap().len()
    }
}

/// Retourne un port local sur lequel plus rien n'écoute.
///
/// Le listener est relâché avant le retour: une connexion vers ce port est
/// refusée, ce qui reproduit un backend éteint.
pub fn unused_local_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind ephemeral port");
    listener.local_addr().expect("local addr").port()
}

/// Démarre un serveur local qui accepte chaque connexion puis la ferme
/// sans répondre, et retourne son port.
///
/// Reproduit un backend qui coupe la connexion en cours d'échange. Le thread
/// d'écoute vit jusqu'à la fin du process de test.
pub fn closing_local_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind ephemeral port");
    let port = listener.local_addr().expect("local addr").port();
    thread::spawn(move || {
        for stream in listener.incoming() {
            drop(stream);
        }
    });
    port
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    #[test]
    fn test_log_capture_counts_levels() {
        let (capture, _guard) = LogCapture::install();

        tracing::error!("boom");
        tracing::warn!("careful");
        tracing::warn!("careful again");
        tracing::info!("ignored");

        assert_eq!(capture.errors(), 1);
        assert_eq!(capture.warnings(), 2);
    }

    #[test]
    fn test_recording_clock() {
        let clock = RecordingClock::new();
        clock.record(Duration::from_secs(10));
        clock.record(Duration::ZERO);

        assert_eq!(clock.sleep_count(), 2);
        assert_eq!(clock.sleeps(), vec![Duration::from_secs(10), Duration::ZERO]);
    }

    #[test]
    fn test_unused_port_refuses_connections() {
        let port = unused_local_port();
        assert!(std::net::TcpStream::connect(("127.0.0.1", port)).is_err());
    }

    #[test]
    fn test_closing_port_accepts_then_hangs_up() {
        let port = closing_local_port();
        let mut stream = std::net::TcpStream::connect(("127.0.0.1", port)).unwrap();

        let mut buf = [0u8; 16];
        // EOF or reset, never data
        match stream.read(&mut buf) {
            Ok(n) => assert_eq!(n, 0),
            Err(e) => assert!(matches!(
                e.kind(),
                std::io::ErrorKind::ConnectionReset | std::io::ErrorKind::ConnectionAborted
            )),
        }
    }
}
