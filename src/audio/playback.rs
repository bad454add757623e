use std::{
    fs::File,
    io::BufReader,
    path::{Path, PathBuf},
    sync::{
        mpsc::{self, RecvTimeoutError, Sender},
        Arc, Mutex as StdMutex, MutexGuard,
    },
    thread,
    time::Duration,
};

use async_trait::async_trait;
use log::{debug, warn};
use rodio::{Decoder, OutputStream, OutputStreamHandle, Sink};
use serde::Serialize;
use tokio::sync::{oneshot, Mutex};

use super::PlaybackError;
use crate::{models::RecordingHandle, timer::EventSink};

/// Called once when loaded audio has played to its end.
pub type FinishedCallback = Box<dyn FnOnce() + Send>;

/// Speaker output as seen by a [`PlaybackSession`].
#[async_trait]
pub trait AudioOutput: Send + Sync {
    /// Replaces whatever is loaded with `path`, paused at the start.
    async fn load(&self, path: &Path, on_finished: FinishedCallback) -> Result<(), PlaybackError>;

    async fn play(&self) -> Result<(), PlaybackError>;

    async fn pause(&self) -> Result<(), PlaybackError>;

    /// Unloads; a pending finished callback is dropped without being called.
    async fn stop(&self) -> Result<(), PlaybackError>;

    async fn set_volume(&self, volume: f32) -> Result<(), PlaybackError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase", tag = "type")]
pub enum PlaybackEvent {
    Started { uri: PathBuf },
    Paused,
    Stopped,
    Finished,
}

#[derive(Default)]
struct PlaybackState {
    loaded: Option<PathBuf>,
    playing: bool,
    generation: u64,
}

fn lock(state: &StdMutex<PlaybackState>) -> MutexGuard<'_, PlaybackState> {
    match state.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// At most one loaded recording; playing another tears the current one down.
pub struct PlaybackSession {
    output: Arc<dyn AudioOutput>,
    state: Arc<StdMutex<PlaybackState>>,
    sink: EventSink<PlaybackEvent>,
    ops: Mutex<()>,
}

impl PlaybackSession {
    pub fn new(output: Arc<dyn AudioOutput>, sink: EventSink<PlaybackEvent>) -> Self {
        Self {
            output,
            state: Arc::new(StdMutex::new(PlaybackState::default())),
            sink,
            ops: Mutex::new(()),
        }
    }

    /// Plays `handle` from the start, or resumes it when it is the recording
    /// already loaded and paused.
    pub async fn play(&self, handle: &RecordingHandle) -> Result<(), PlaybackError> {
        let _op = self.ops.lock().await;

        let (resume, had_other) = {
            let state = lock(&self.state);
            match &state.loaded {
                Some(loaded) if loaded == handle.path() => (!state.playing, false),
                Some(_) => (false, true),
                None => (false, false),
            }
        };

        if resume {
            self.output.play().await?;
            lock(&self.state).playing = true;
            (self.sink)(PlaybackEvent::Started {
                uri: handle.uri.clone(),
            });
            return Ok(());
        }
        if lock(&self.state).playing && !had_other {
            return Ok(());
        }
        if had_other {
            self.teardown().await?;
        }

        let generation = {
            let mut state = lock(&self.state);
            state.generation = state.generation.wrapping_add(1);
            state.generation
        };
        let on_finished = self.finished_callback(generation);

        if let Err(err) = self.output.load(handle.path(), on_finished).await {
            warn!("playback load failed for {}: {err}", handle.path().display());
            let mut state = lock(&self.state);
            state.loaded = None;
            state.playing = false;
            return Err(err);
        }
        lock(&self.state).loaded = Some(handle.uri.clone());

        self.output.play().await?;
        lock(&self.state).playing = true;
        (self.sink)(PlaybackEvent::Started {
            uri: handle.uri.clone(),
        });
        Ok(())
    }

    pub async fn pause(&self) -> Result<(), PlaybackError> {
        let _op = self.ops.lock().await;
        if lock(&self.state).loaded.is_none() {
            return Err(PlaybackError::NothingLoaded);
        }
        self.output.pause().await?;
        let was_playing = std::mem::replace(&mut lock(&self.state).playing, false);
        if was_playing {
            (self.sink)(PlaybackEvent::Paused);
        }
        Ok(())
    }

    /// Unloads the current recording. A no-op when nothing is loaded.
    pub async fn stop(&self) -> Result<(), PlaybackError> {
        let _op = self.ops.lock().await;
        self.teardown().await
    }

    pub async fn set_volume(&self, volume: f32) -> Result<(), PlaybackError> {
        self.output.set_volume(volume.clamp(0.0, 1.0)).await
    }

    pub fn is_playing(&self) -> bool {
        lock(&self.state).playing
    }

    pub fn loaded(&self) -> Option<PathBuf> {
        lock(&self.state).loaded.clone()
    }

    async fn teardown(&self) -> Result<(), PlaybackError> {
        let had_loaded = {
            let mut state = lock(&self.state);
            state.generation = state.generation.wrapping_add(1);
            state.playing = false;
            state.loaded.take().is_some()
        };
        if had_loaded {
            self.output.stop().await?;
            (self.sink)(PlaybackEvent::Stopped);
        }
        Ok(())
    }

    fn finished_callback(&self, generation: u64) -> FinishedCallback {
        let state = Arc::clone(&self.state);
        let sink = self.sink.clone();
        Box::new(move || {
            let mut guard = lock(&state);
            if guard.generation != generation || !guard.playing {
                return;
            }
            guard.playing = false;
            guard.loaded = None;
            drop(guard);
            debug!("playback finished");
            sink(PlaybackEvent::Finished);
        })
    }
}

type Reply = oneshot::Sender<Result<(), PlaybackError>>;

enum OutputCommand {
    Load {
        path: PathBuf,
        on_finished: FinishedCallback,
        reply: Reply,
    },
    Play(Reply),
    Pause(Reply),
    Stop(Reply),
    SetVolume(f32, Reply),
}

const FINISH_POLL: Duration = Duration::from_millis(50);

/// Default output device through rodio, driven from a dedicated thread that
/// owns the non-`Send` stream and sink.
pub struct RodioOutput {
    tx: StdMutex<Option<Sender<OutputCommand>>>,
}

impl RodioOutput {
    pub fn new() -> Self {
        Self {
            tx: StdMutex::new(None),
        }
    }

    fn ensure_thread(&self) -> Result<Sender<OutputCommand>, PlaybackError> {
        let mut guard = self
            .tx
            .lock()
            .map_err(|e| PlaybackError::DeviceError(e.to_string()))?;
        if let Some(tx) = guard.as_ref() {
            return Ok(tx.clone());
        }

        let (tx, rx) = mpsc::channel::<OutputCommand>();

        thread::Builder::new()
            .name("audio-playback".to_string())
            .spawn(move || {
                let mut stream: Option<(OutputStream, OutputStreamHandle)> = None;
                let mut sink: Option<Sink> = None;
                let mut on_finished: Option<FinishedCallback> = None;
                let mut volume = 1.0_f32;

                loop {
                    let cmd = match rx.recv_timeout(FINISH_POLL) {
                        Ok(cmd) => cmd,
                        Err(RecvTimeoutError::Timeout) => {
                            if sink.as_ref().map(Sink::empty).unwrap_or(false) {
                                if let Some(callback) = on_finished.take() {
                                    callback();
                                }
                            }
                            continue;
                        }
                        Err(RecvTimeoutError::Disconnected) => break,
                    };

                    match cmd {
                        OutputCommand::Load {
                            path,
                            on_finished: callback,
                            reply,
                        } => {
                            if let Some(old) = sink.take() {
                                old.stop();
                            }
                            on_finished = None;
                            let result = open_sink(&mut stream, &path, volume).map(|new_sink| {
                                sink = Some(new_sink);
                                on_finished = Some(callback);
                            });
                            let _ = reply.send(result);
                        }
                        OutputCommand::Play(reply) => {
                            let result = match sink.as_ref() {
                                Some(s) => {
                                    s.play();
                                    Ok(())
                                }
                                None => Err(PlaybackError::NothingLoaded),
                            };
                            let _ = reply.send(result);
                        }
                        OutputCommand::Pause(reply) => {
                            let result = match sink.as_ref() {
                                Some(s) => {
                                    s.pause();
                                    Ok(())
                                }
                                None => Err(PlaybackError::NothingLoaded),
                            };
                            let _ = reply.send(result);
                        }
                        OutputCommand::Stop(reply) => {
                            if let Some(old) = sink.take() {
                                old.stop();
                            }
                            on_finished = None;
                            let _ = reply.send(Ok(()));
                        }
                        OutputCommand::SetVolume(v, reply) => {
                            volume = v.clamp(0.0, 1.0);
                            if let Some(s) = sink.as_ref() {
                                s.set_volume(volume);
                            }
                            let _ = reply.send(Ok(()));
                        }
                    }
                }
            })
            .map_err(|e| PlaybackError::DeviceError(e.to_string()))?;

        *guard = Some(tx.clone());
        Ok(tx)
    }

    async fn request(
        &self,
        cmd: OutputCommand,
        reply: oneshot::Receiver<Result<(), PlaybackError>>,
    ) -> Result<(), PlaybackError> {
        let tx = self.ensure_thread()?;
        tx.send(cmd)
            .map_err(|_| PlaybackError::DeviceError("playback thread stopped".to_string()))?;
        reply
            .await
            .map_err(|_| PlaybackError::DeviceError("playback thread dropped reply".to_string()))?
    }
}

impl Default for RodioOutput {
    fn default() -> Self {
        Self::new()
    }
}

fn open_sink(
    stream: &mut Option<(OutputStream, OutputStreamHandle)>,
    path: &Path,
    volume: f32,
) -> Result<Sink, PlaybackError> {
    let file = File::open(path)
        .map_err(|e| PlaybackError::LoadError(format!("{}: {e}", path.display())))?;
    let source = Decoder::new(BufReader::new(file))
        .map_err(|e| PlaybackError::LoadError(format!("{}: {e}", path.display())))?;

    if stream.is_none() {
        let opened = OutputStream::try_default()
            .map_err(|e| PlaybackError::DeviceError(format!("Failed to open audio output: {e}")))?;
        *stream = Some(opened);
    }
    let handle = match stream.as_ref() {
        Some((_, handle)) => handle,
        None => return Err(PlaybackError::DeviceError("no output stream".to_string())),
    };
    let sink = Sink::try_new(handle)
        .map_err(|e| PlaybackError::DeviceError(format!("Failed to create audio sink: {e}")))?;
    sink.pause();
    sink.set_volume(volume);
    sink.append(source);
    Ok(sink)
}

#[async_trait]
impl AudioOutput for RodioOutput {
    async fn load(&self, path: &Path, on_finished: FinishedCallback) -> Result<(), PlaybackError> {
        let (reply, rx) = oneshot::channel();
        self.request(
            OutputCommand::Load {
                path: path.to_path_buf(),
                on_finished,
                reply,
            },
            rx,
        )
        .await
    }

    async fn play(&self) -> Result<(), PlaybackError> {
        let (reply, rx) = oneshot::channel();
        self.request(OutputCommand::Play(reply), rx).await
    }

    async fn pause(&self) -> Result<(), PlaybackError> {
        let (reply, rx) = oneshot::channel();
        self.request(OutputCommand::Pause(reply), rx).await
    }

    async fn stop(&self) -> Result<(), PlaybackError> {
        let (reply, rx) = oneshot::channel();
        self.request(OutputCommand::Stop(reply), rx).await
    }

    async fn set_volume(&self, volume: f32) -> Result<(), PlaybackError> {
        let (reply, rx) = oneshot::channel();
        self.request(OutputCommand::SetVolume(volume, reply), rx).await
    }
}
