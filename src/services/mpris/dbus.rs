//! zbus implementation of the remote capabilities.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use futures::StreamExt;
use futures::stream::BoxStream;
use tokio::sync::OnceCell;
use tracing::{debug, instrument};
use zbus::{
    Connection, MatchRule, Message, MessageStream, fdo,
    message::Type as MessageType,
    names::BusName,
    zvariant::{ObjectPath, OwnedValue, Value},
};

use super::{
    MediaError, MetadataMap, MetadataValue, Playlist,
    proxy::{MediaPlayer2PlaylistsProxy, MediaPlayer2PlayerProxy, MediaPlayer2Proxy},
    remote::{MediaBus, OwnerChange, RemotePlayer, RemoteSignal},
};

const MPRIS_PATH: &str = "/org/mpris/MediaPlayer2";
const PROPERTIES_INTERFACE: &str = "org.freedesktop.DBus.Properties";
const BASE_INTERFACE: &str = "org.mpris.MediaPlayer2";
const PLAYER_INTERFACE: &str = "org.mpris.MediaPlayer2.Player";
const PLAYLISTS_INTERFACE: &str = "org.mpris.MediaPlayer2.Playlists";

/// Player properties whose change means the capabilities must be re-read
const CONTROL_PROPERTIES: [&str; 4] = ["CanPause", "CanGoNext", "CanGoPrevious", "CanSeek"];

/// Session bus access for player discovery
pub struct DbusMediaBus {
    connection: Connection,
    dbus: OnceCell<fdo::DBusProxy<'static>>,
}

impl DbusMediaBus {
    /// Wrap an existing connection
    pub fn new(connection: Connection) -> Self {
        Self {
            connection,
            dbus: OnceCell::new(),
        }
    }

    /// Connect to the session bus
    ///
    /// # Errors
    /// Returns error if the session bus is unreachable
    #[instrument]
    pub async fn session() -> Result<Self, MediaError> {
        let connection = Connection::session().await.map_err(|e| {
            MediaError::InitializationFailed(format!("D-Bus connection failed: {e}"))
        })?;
        Ok(Self::new(connection))
    }

    async fn dbus(&self) -> Result<&fdo::DBusProxy<'static>, MediaError> {
        self.dbus
            .get_or_try_init(|| async {
                fdo::DBusProxy::new(&self.connection).await.map_err(|e| {
                    MediaError::InitializationFailed(format!("DBus proxy failed: {e}"))
                })
            })
            .await
    }
}

#[async_trait]
impl MediaBus for DbusMediaBus {
    async fn list_names(&self) -> Result<Vec<String>, MediaError> {
        let names = self.dbus().await?.list_names().await?;
        Ok(names.into_iter().map(|name| name.to_string()).collect())
    }

    async fn name_owner(&self, name: &str) -> Result<String, MediaError> {
        let bus_name = BusName::try_from(name).map_err(|e| MediaError::DbusError(e.into()))?;
        let owner = self.dbus().await?.get_name_owner(bus_name).await?;
        Ok(owner.to_string())
    }

    async fn owner_changes(&self) -> Result<BoxStream<'static, OwnerChange>, MediaError> {
        let signals = self
            .dbus()
            .await?
            .receive_name_owner_changed()
            .await
            .map_err(|e| {
                MediaError::InitializationFailed(format!("Signal subscription failed: {e}"))
            })?;

        let changes = signals.filter_map(|signal| async move {
            let args = signal.args().ok()?;
            let old_owner = args
                .old_owner()
                .as_deref()
                .map(ToString::to_string)
                .unwrap_or_default();
            let new_owner = args
                .new_owner()
                .as_deref()
                .map(ToString::to_string)
                .unwrap_or_default();
            Some(OwnerChange::from_raw(
                args.name().as_str(),
                &old_owner,
                &new_owner,
            ))
        });

        Ok(changes.boxed())
    }

    fn player(&self, bus_name: &str) -> Arc<dyn RemotePlayer> {
        Arc::new(DbusRemotePlayer::new(self.connection.clone(), bus_name))
    }
}

struct Proxies {
    base: MediaPlayer2Proxy<'static>,
    player: MediaPlayer2PlayerProxy<'static>,
    playlists: MediaPlayer2PlaylistsProxy<'static>,
}

/// One MPRIS player reached over D-Bus
///
/// Proxies are built on first use so handing out a player never blocks.
pub struct DbusRemotePlayer {
    connection: Connection,
    bus_name: String,
    proxies: OnceCell<Proxies>,
}

impl DbusRemotePlayer {
    fn new(connection: Connection, bus_name: &str) -> Self {
        Self {
            connection,
            bus_name: bus_name.to_string(),
            proxies: OnceCell::new(),
        }
    }

    async fn proxies(&self) -> Result<&Proxies, MediaError> {
        self.proxies
            .get_or_try_init(|| async {
                let base = MediaPlayer2Proxy::builder(&self.connection)
                    .destination(self.bus_name.clone())?
                    .build()
                    .await?;
                let player = MediaPlayer2PlayerProxy::builder(&self.connection)
                    .destination(self.bus_name.clone())?
                    .build()
                    .await?;
                let playlists = MediaPlayer2PlaylistsProxy::builder(&self.connection)
                    .destination(self.bus_name.clone())?
                    .build()
                    .await?;
                Ok::<_, MediaError>(Proxies {
                    base,
                    player,
                    playlists,
                })
            })
            .await
    }

    async fn base(&self) -> Result<&MediaPlayer2Proxy<'static>, MediaError> {
        Ok(&self.proxies().await?.base)
    }

    async fn player(&self) -> Result<&MediaPlayer2PlayerProxy<'static>, MediaError> {
        Ok(&self.proxies().await?.player)
    }

    async fn playlists(&self) -> Result<&MediaPlayer2PlaylistsProxy<'static>, MediaError> {
        Ok(&self.proxies().await?.playlists)
    }
}

#[async_trait]
impl RemotePlayer for DbusRemotePlayer {
    async fn raise(&self) -> Result<(), MediaError> {
        Ok(self.base().await?.raise().await?)
    }

    async fn quit(&self) -> Result<(), MediaError> {
        Ok(self.base().await?.quit().await?)
    }

    async fn next(&self) -> Result<(), MediaError> {
        Ok(self.player().await?.next().await?)
    }

    async fn previous(&self) -> Result<(), MediaError> {
        Ok(self.player().await?.previous().await?)
    }

    async fn pause(&self) -> Result<(), MediaError> {
        Ok(self.player().await?.pause().await?)
    }

    async fn play_pause(&self) -> Result<(), MediaError> {
        Ok(self.player().await?.play_pause().await?)
    }

    async fn stop(&self) -> Result<(), MediaError> {
        Ok(self.player().await?.stop().await?)
    }

    async fn play(&self) -> Result<(), MediaError> {
        Ok(self.player().await?.play().await?)
    }

    async fn set_position(&self, track_id: &str, position_us: i64) -> Result<(), MediaError> {
        let track = ObjectPath::try_from(track_id)
            .or_else(|_| ObjectPath::try_from("/"))
            .map_err(|e| MediaError::ControlFailed(format!("invalid track id: {e}")))?;
        Ok(self
            .player()
            .await?
            .set_position(&track, position_us)
            .await?)
    }

    async fn get_playlists(
        &self,
        index: u32,
        count: u32,
        order: &str,
        reverse: bool,
    ) -> Result<Vec<Playlist>, MediaError> {
        let entries = self
            .playlists()
            .await?
            .get_playlists(index, count, order, reverse)
            .await?;
        Ok(entries
            .into_iter()
            .map(|(id, name, _icon)| Playlist {
                id: id.to_string(),
                name,
            })
            .collect())
    }

    async fn activate_playlist(&self, playlist_id: &str) -> Result<(), MediaError> {
        let path = ObjectPath::try_from(playlist_id)
            .map_err(|e| MediaError::ControlFailed(format!("invalid playlist id: {e}")))?;
        Ok(self.playlists().await?.activate_playlist(&path).await?)
    }

    async fn identity(&self) -> Result<String, MediaError> {
        Ok(self.base().await?.identity().await?)
    }

    async fn desktop_entry(&self) -> Result<String, MediaError> {
        Ok(self.base().await?.desktop_entry().await?)
    }

    async fn can_raise(&self) -> Result<bool, MediaError> {
        Ok(self.base().await?.can_raise().await?)
    }

    async fn can_quit(&self) -> Result<bool, MediaError> {
        Ok(self.base().await?.can_quit().await?)
    }

    async fn can_seek(&self) -> Result<bool, MediaError> {
        Ok(self.player().await?.can_seek().await?)
    }

    async fn can_pause(&self) -> Result<bool, MediaError> {
        Ok(self.player().await?.can_pause().await?)
    }

    async fn can_go_next(&self) -> Result<bool, MediaError> {
        Ok(self.player().await?.can_go_next().await?)
    }

    async fn can_go_previous(&self) -> Result<bool, MediaError> {
        Ok(self.player().await?.can_go_previous().await?)
    }

    async fn volume(&self) -> Result<f64, MediaError> {
        Ok(self.player().await?.volume().await?)
    }

    async fn set_volume(&self, volume: f64) -> Result<(), MediaError> {
        Ok(self.player().await?.set_volume(volume).await?)
    }

    async fn playback_status(&self) -> Result<String, MediaError> {
        Ok(self.player().await?.playback_status().await?)
    }

    async fn metadata(&self) -> Result<MetadataMap, MediaError> {
        let raw = self.player().await?.metadata().await?;
        Ok(convert_metadata(&raw))
    }

    async fn position(&self) -> Result<i64, MediaError> {
        Ok(self.player().await?.position().await?)
    }

    async fn active_playlist(&self) -> Result<Option<Playlist>, MediaError> {
        let raw = self.playlists().await?.active_playlist().await?;
        Ok(parse_active_playlist(&raw))
    }

    async fn signals(&self) -> Result<BoxStream<'static, RemoteSignal>, MediaError> {
        let bus_name =
            BusName::try_from(self.bus_name.as_str()).map_err(|e| MediaError::DbusError(e.into()))?;
        let owner = fdo::DBusProxy::new(&self.connection)
            .await?
            .get_name_owner(bus_name)
            .await?;

        // One stream for every signal the player sends, so property changes
        // and seeks are seen in bus order.
        let rule = MatchRule::builder()
            .msg_type(MessageType::Signal)
            .sender(owner.as_str())?
            .path(MPRIS_PATH)?
            .build();
        let mut messages = MessageStream::for_match_rule(rule, &self.connection, None).await?;
        let bus_name = self.bus_name.clone();

        let stream = async_stream::stream! {
            while let Some(message) = messages.next().await {
                let message = match message {
                    Ok(message) => message,
                    Err(e) => {
                        debug!(%bus_name, "Dropped malformed player signal: {e}");
                        continue;
                    }
                };
                for signal in decode_signal(&message) {
                    yield signal;
                }
            }
            debug!(%bus_name, "Player signal stream ended");
        };

        Ok(stream.boxed())
    }
}

fn decode_signal(message: &Message) -> Vec<RemoteSignal> {
    let header = message.header();
    let (Some(interface), Some(member)) = (header.interface(), header.member()) else {
        return Vec::new();
    };

    match (interface.as_str(), member.as_str()) {
        (PROPERTIES_INTERFACE, "PropertiesChanged") => {
            match message
                .body()
                .deserialize::<(String, HashMap<String, OwnedValue>, Vec<String>)>()
            {
                Ok((interface, changed, _invalidated)) => property_signals(&interface, changed),
                Err(e) => {
                    debug!("Unreadable PropertiesChanged: {e}");
                    Vec::new()
                }
            }
        }
        (PLAYER_INTERFACE, "Seeked") => match message.body().deserialize::<(i64,)>() {
            Ok((position,)) => vec![RemoteSignal::Seeked(position)],
            Err(e) => {
                debug!("Unreadable Seeked: {e}");
                Vec::new()
            }
        },
        _ => Vec::new(),
    }
}

/// Translate one `PropertiesChanged` payload.
///
/// Several properties changed together are always reported as volume,
/// status, metadata, capabilities, whatever order the payload lists them in.
fn property_signals(interface: &str, mut changed: HashMap<String, OwnedValue>) -> Vec<RemoteSignal> {
    let mut signals = Vec::new();
    match interface {
        BASE_INTERFACE => {
            if let Some(identity) = changed.get("Identity").and_then(text) {
                signals.push(RemoteSignal::Identity(identity));
            }
        }
        PLAYER_INTERFACE => {
            if let Some(volume) = changed.get("Volume").and_then(float) {
                signals.push(RemoteSignal::Volume(volume));
            }
            if let Some(status) = changed.get("PlaybackStatus").and_then(text) {
                signals.push(RemoteSignal::PlaybackStatus(status));
            }
            if let Some(raw) = changed.remove("Metadata") {
                match HashMap::<String, OwnedValue>::try_from(raw) {
                    Ok(metadata) => signals.push(RemoteSignal::Metadata(convert_metadata(&metadata))),
                    Err(e) => debug!("Unreadable Metadata change: {e}"),
                }
            }
            if CONTROL_PROPERTIES
                .iter()
                .any(|property| changed.contains_key(*property))
            {
                signals.push(RemoteSignal::ControlsChanged);
            }
        }
        PLAYLISTS_INTERFACE => {
            if let Some(raw) = changed.get("ActivePlaylist") {
                signals.push(RemoteSignal::ActivePlaylist(parse_active_playlist(raw)));
            }
        }
        _ => {}
    }
    signals
}

fn unwrap_variant<'a, 'v>(value: &'a Value<'v>) -> &'a Value<'v> {
    match value {
        Value::Value(inner) => unwrap_variant(inner),
        other => other,
    }
}

fn text(value: &OwnedValue) -> Option<String> {
    match unwrap_variant(value) {
        Value::Str(text) => Some(text.as_str().to_string()),
        _ => None,
    }
}

fn float(value: &OwnedValue) -> Option<f64> {
    match unwrap_variant(value) {
        Value::F64(number) => Some(*number),
        _ => None,
    }
}

fn convert_value(value: &Value<'_>) -> Option<MetadataValue> {
    let converted = match value {
        Value::Str(text) => MetadataValue::Text(text.as_str().to_string()),
        Value::ObjectPath(path) => MetadataValue::Text(path.as_str().to_string()),
        Value::Bool(flag) => MetadataValue::Boolean(*flag),
        Value::U8(number) => MetadataValue::Unsigned(u64::from(*number)),
        Value::I16(number) => MetadataValue::Integer(i64::from(*number)),
        Value::U16(number) => MetadataValue::Unsigned(u64::from(*number)),
        Value::I32(number) => MetadataValue::Integer(i64::from(*number)),
        Value::U32(number) => MetadataValue::Unsigned(u64::from(*number)),
        Value::I64(number) => MetadataValue::Integer(*number),
        Value::U64(number) => MetadataValue::Unsigned(*number),
        Value::F64(number) => MetadataValue::Float(*number),
        Value::Value(inner) => return convert_value(inner),
        Value::Array(array) => MetadataValue::TextList(
            array
                .iter()
                .filter_map(|item| match convert_value(item)? {
                    MetadataValue::Text(text) => Some(text),
                    _ => None,
                })
                .collect(),
        ),
        _ => return None,
    };
    Some(converted)
}

fn convert_metadata(raw: &HashMap<String, OwnedValue>) -> MetadataMap {
    raw.iter()
        .filter_map(|(key, value)| Some((key.clone(), convert_value(value)?)))
        .collect()
}

fn parse_active_playlist(raw: &OwnedValue) -> Option<Playlist> {
    let Value::Structure(outer) = &**raw else {
        return None;
    };
    let [Value::Bool(valid), Value::Structure(inner)] = outer.fields() else {
        return None;
    };
    if !*valid {
        return None;
    }
    match inner.fields() {
        [Value::ObjectPath(id), Value::Str(name), ..] => Some(Playlist {
            id: id.as_str().to_string(),
            name: name.as_str().to_string(),
        }),
        _ => None,
    }
}
