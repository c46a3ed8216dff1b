use eframe::egui::{self, Color32, RichText, Ui};

use crate::net::{ChatBody, ChatMessage, ConnectionEntry, ConnectionStatus, ReplyStatus};
use crate::util::{clip_text, format_ttl, short_id};

use super::super::LiveView;
use super::super::graph::{NodeInfo, NodeKind};

const CONTEXT_PREVIEW_CHARS: usize = 120;

fn feed_status_text(live_updates: bool, status: Option<ConnectionStatus>) -> &'static str {
    match status {
        _ if !live_updates => "live updates disabled",
        Some(status) => status.label(),
        None => ConnectionStatus::Idle.label(),
    }
}

fn draw_feed_caption<F>(ui: &mut Ui, live_updates: bool, entry: Option<&ConnectionEntry<F>>) {
    let status = feed_status_text(live_updates, entry.map(ConnectionEntry::status));
    let caption = match entry.map(ConnectionEntry::attempts) {
        Some(attempts) if attempts > 0 => format!("{status} (retry {attempts})"),
        _ => status.to_owned(),
    };
    let response = ui.small(caption);
    if let Some(url) = entry.and_then(ConnectionEntry::url) {
        response.on_hover_text(url);
    }
}

fn reply_status_text(status: ReplyStatus, finish_reason: Option<&str>) -> String {
    match (status, finish_reason) {
        (ReplyStatus::Streaming, _) => "streaming...".to_owned(),
        (ReplyStatus::Interrupted, _) => "interrupted".to_owned(),
        (ReplyStatus::Completed, Some(reason)) if reason != "stop" => format!("done ({reason})"),
        (ReplyStatus::Completed, _) => "done".to_owned(),
    }
}

impl LiveView {
    pub(in crate::app) fn draw_details(&mut self, ui: &mut Ui) {
        ui.heading("Selection Details");
        ui.add_space(6.0);

        let Some(selected_id) = self.selected.clone() else {
            ui.label("Select a hub or device in the graph.");
            return;
        };

        let Some(node) = self.graph.node(&selected_id) else {
            ui.label("The selected node is no longer part of the network.");
            return;
        };

        let mut pending_selection = None;
        ui.label(RichText::new(node.label.as_str()).strong());
        ui.small(node.id.as_str());
        ui.label(format!("Type: {}", node.kind.label()));
        ui.add_space(6.0);

        match &node.info {
            NodeInfo::Hub(hub) => {
                ui.label(format!("Linked hubs: {}", hub.connected_hubs.len()));
                ui.label(format!("Devices: {}", hub.connected_devices.len()));
                if node.empty_hub {
                    ui.label(RichText::new("No devices connected").weak());
                }
                for id in hub.connected_hubs.iter().chain(&hub.connected_devices) {
                    let Some(peer) = self.graph.node(id) else {
                        continue;
                    };
                    let text = format!("{} {}  ({})", peer.kind.label(), peer.label, short_id(id));
                    if ui.link(text).on_hover_text(id.as_str()).clicked() {
                        pending_selection = Some(id.clone());
                    }
                }
            }
            NodeInfo::Device(_) => {
                match node.assigned_hub() {
                    Some(hub_id) => {
                        let hub_label = self
                            .graph
                            .node(hub_id)
                            .map(|hub| hub.label.clone())
                            .unwrap_or_else(|| short_id(hub_id).to_owned());
                        ui.horizontal(|ui| {
                            ui.label("Hub:");
                            if ui.link(hub_label).on_hover_text(hub_id).clicked() {
                                pending_selection = Some(hub_id.to_owned());
                            }
                        });
                    }
                    None => {
                        ui.label("Hub: unassigned");
                    }
                }
                if node.streaming {
                    ui.label(RichText::new("Replying...").color(Color32::from_rgb(255, 169, 244)));
                }
            }
        }

        ui.separator();
        match node.kind {
            NodeKind::Hub => self.draw_packet_feed(ui),
            NodeKind::Device => self.draw_device_feed(ui),
        }

        if let Some(id) = pending_selection {
            self.set_selected(Some(id));
        }
    }

    fn draw_packet_feed(&self, ui: &mut Ui) {
        let entry = self.streams.hub_feed();
        ui.label(RichText::new("Packet stream").strong());
        draw_feed_caption(ui, self.live_updates, entry);
        ui.add_space(4.0);

        let Some(entry) = entry else {
            return;
        };
        if entry.feed.entries().is_empty() {
            ui.label(RichText::new("No packets yet.").weak());
            return;
        }

        egui::ScrollArea::vertical()
            .id_salt("packet_feed_scroll")
            .auto_shrink([false, false])
            .show(ui, |ui| {
                for item in entry.feed.entries().iter().rev() {
                    let packet = &item.packet;
                    ui.horizontal_wrapped(|ui| {
                        ui.label(RichText::new(packet.type_label()).strong());
                        ui.label(format!(
                            "{} -> {}",
                            packet.sender.as_deref().map(short_id).unwrap_or("?"),
                            packet.recipient.as_deref().map(short_id).unwrap_or("*"),
                        ));
                        ui.label(format!(
                            "ttl {}",
                            format_ttl(packet.ttl, packet.original_ttl)
                        ));
                        if let Some(received_at) = &item.received_at {
                            ui.small(received_at.as_str());
                        }
                    });
                    if let Some(context) = packet.context.as_deref().filter(|text| !text.is_empty()) {
                        ui.label(RichText::new(clip_text(context, CONTEXT_PREVIEW_CHARS)).weak());
                    }
                    ui.separator();
                }
            });
    }

    fn draw_device_feed(&self, ui: &mut Ui) {
        let entry = self.streams.device_feed();
        ui.label(RichText::new("Conversation").strong());
        draw_feed_caption(ui, self.live_updates, entry);
        ui.add_space(4.0);

        let Some(entry) = entry else {
            return;
        };
        let feed = &entry.feed;

        egui::CollapsingHeader::new(format!("Contacts ({})", feed.contacts().len()))
            .id_salt("device_contacts")
            .default_open(false)
            .show(ui, |ui| {
                if let Some(updated) = feed.contacts_updated() {
                    ui.small(format!("updated {updated}"));
                }
                if feed.contacts().is_empty() {
                    ui.label(RichText::new("No contacts.").weak());
                }
                for contact in feed.contacts() {
                    let name = contact.display_name.as_deref().unwrap_or(contact.alias.as_str());
                    ui.label(format!(
                        "@{}  {}  [{}]  {}",
                        contact.alias,
                        name,
                        contact.kind,
                        short_id(&contact.uuid)
                    ))
                    .on_hover_text(contact.uuid.as_str());
                }
            });
        ui.separator();

        if feed.messages().is_empty() {
            ui.label(RichText::new("No messages yet.").weak());
            return;
        }

        egui::ScrollArea::vertical()
            .id_salt("device_feed_scroll")
            .auto_shrink([false, false])
            .stick_to_bottom(true)
            .show(ui, |ui| {
                for message in feed.messages() {
                    draw_chat_message(ui, message);
                    ui.add_space(4.0);
                }
            });
    }
}

fn draw_chat_message(ui: &mut Ui, message: &ChatMessage) {
    let stamp = message.timestamp.as_deref().unwrap_or("");
    match &message.body {
        ChatBody::User { content } => {
            ui.label(RichText::new(format!("user  {stamp}")).small().weak());
            ui.label(content.as_str());
        }
        ChatBody::Assistant {
            content,
            reasoning,
            status,
            finish_reason,
            ..
        } => {
            ui.label(
                RichText::new(format!(
                    "assistant  {}  {stamp}",
                    reply_status_text(*status, finish_reason.as_deref())
                ))
                .small()
                .weak(),
            );
            if !reasoning.is_empty() {
                ui.label(RichText::new(reasoning.join("")).italics().weak());
            }
            ui.label(content.as_str());
        }
        ChatBody::ToolCall {
            name,
            arguments,
            result,
            ..
        } => {
            ui.label(
                RichText::new(format!("tool {}  {stamp}", name.as_deref().unwrap_or("?")))
                    .small()
                    .weak(),
            );
            if let Some(arguments) = arguments {
                ui.monospace(arguments.as_str());
            }
            if let Some(result) = result {
                ui.label(format!("=> {result}"));
            }
        }
        ChatBody::ToolResult { result, .. } => {
            ui.label(RichText::new(format!("tool result  {stamp}")).small().weak());
            ui.monospace(result.as_str());
        }
        ChatBody::System { content } => {
            ui.label(RichText::new(content.as_str()).italics().color(Color32::from_gray(160)));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reply_labels() {
        assert_eq!(reply_status_text(ReplyStatus::Streaming, None), "streaming...");
        assert_eq!(reply_status_text(ReplyStatus::Completed, Some("stop")), "done");
        assert_eq!(reply_status_text(ReplyStatus::Completed, Some("length")), "done (length)");
        assert_eq!(reply_status_text(ReplyStatus::Interrupted, Some("interrupted")), "interrupted");
    }

    #[test]
    fn feed_status_reflects_live_updates() {
        assert_eq!(feed_status_text(false, Some(ConnectionStatus::Open)), "live updates disabled");
        assert_eq!(feed_status_text(true, Some(ConnectionStatus::Open)), "receiving");
        assert_eq!(feed_status_text(true, None), "not connected");
    }
}
