use std::collections::HashSet;

use rtp::extension::sdes_mid_extension::MidExtension;
use rtp::extension::{HeaderExtension, SDES_MID_URI};
use rtp::header::Header;

/// RtpExtmap is one negotiated `a=extmap` line of the remote description.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RtpExtmap {
    pub id: u8,
    pub uri: String,
}

impl RtpExtmap {
    pub fn new(id: u8, uri: impl Into<String>) -> Self {
        RtpExtmap {
            id,
            uri: uri.into(),
        }
    }
}

/// MediaPipelineFilter decides which inbound RTP belongs to a pipeline when
/// several m-lines share one transport. Remote SSRCs are learned from packets
/// that match by MID or payload type.
#[derive(Default, Debug, Clone, PartialEq, Eq)]
pub struct MediaPipelineFilter {
    remote_ssrc_set: HashSet<u32>,
    payload_type_set: HashSet<u8>,
    remote_mid: Option<String>,
    remote_mid_extension_id: Option<u8>,
    extmap: Vec<RtpExtmap>,
}

impl MediaPipelineFilter {
    pub fn new(extmap: Vec<RtpExtmap>) -> Self {
        let mut filter = MediaPipelineFilter::default();
        for extension in extmap {
            filter.add_extmap(extension);
        }
        filter
    }

    pub fn add_remote_ssrc(&mut self, ssrc: u32) {
        self.remote_ssrc_set.insert(ssrc);
    }

    pub fn add_payload_type(&mut self, payload_type: u8) {
        self.payload_type_set.insert(payload_type);
    }

    pub fn set_remote_mid(&mut self, mid: impl Into<String>) {
        self.remote_mid = Some(mid.into());
    }

    /// Records an extmap entry. The MID extension id is picked up from it.
    pub fn add_extmap(&mut self, extension: RtpExtmap) {
        if extension.uri == SDES_MID_URI {
            self.remote_mid_extension_id = Some(extension.id);
        }
        self.extmap.retain(|e| e.id != extension.id);
        self.extmap.push(extension);
    }

    pub fn extmap(&self) -> &[RtpExtmap] {
        &self.extmap
    }

    pub fn remote_mid(&self) -> Option<&str> {
        self.remote_mid.as_deref()
    }

    pub fn remote_ssrcs(&self) -> &HashSet<u32> {
        &self.remote_ssrc_set
    }

    fn mid_of(&self, header: &Header) -> Option<String> {
        let id = self.remote_mid_extension_id?;
        let payload = header.get_extension(id)?;
        MidExtension::parse(&payload).ok().map(|ext| ext.mid)
    }

    /// Returns whether `header` belongs to this pipeline.
    pub fn filter(&mut self, header: &Header) -> bool {
        if self.remote_ssrc_set.contains(&header.ssrc) {
            return true;
        }

        if let Some(remote_mid) = &self.remote_mid {
            if self.mid_of(header).as_deref() == Some(remote_mid.as_str()) {
                log::debug!("learned ssrc {} from mid {remote_mid}", header.ssrc);
                self.add_remote_ssrc(header.ssrc);
                return true;
            }
        }

        if self.payload_type_set.contains(&header.payload_type) {
            log::debug!(
                "learned ssrc {} from payload type {}",
                header.ssrc,
                header.payload_type
            );
            self.add_remote_ssrc(header.ssrc);
            return true;
        }

        false
    }

    /// Takes the configuration of `other`. Learned SSRCs survive an update
    /// that names none, and the MID binding only moves when the MID itself
    /// changes or signaling has settled.
    pub fn update(&mut self, other: &MediaPipelineFilter, signaling_stable: bool) {
        if !other.remote_ssrc_set.is_empty() {
            self.remote_ssrc_set = other.remote_ssrc_set.clone();
        }

        if other.remote_mid != self.remote_mid || signaling_stable {
            self.remote_mid = other.remote_mid.clone();
            self.remote_mid_extension_id = other.remote_mid_extension_id;
        }

        self.payload_type_set = other.payload_type_set.clone();
        self.extmap = other.extmap.clone();
    }
}
