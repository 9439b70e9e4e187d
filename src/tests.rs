//! Crate-level integration tests exercising the wire codec end to end,
//! across module boundaries that each module's own unit tests don't cross.

use std::io::Cursor;

use crate::event::EventDirection::{ClientBound, ServerBound};
use crate::event::EventState;
use crate::serialization::Readable;
use crate::versions::common::VarInt;
use crate::versions::v47::{decode, encode_framed, Event, Handshake, StatusRequest, StatusResponse};

fn round_trip(direction: crate::event::EventDirection, state: EventState, event: Event) -> Event {
    let framed = encode_framed(&event).unwrap();
    let mut cursor = Cursor::new(&framed);
    let id = VarInt::read_from(&mut cursor).unwrap().0;
    decode(direction, state, id, &mut cursor).unwrap()
}

#[test]
fn handshake_round_trips() {
    let event = Event::Handshake(Handshake {
        protocol_version: VarInt(47),
        server_address: "127.0.0.1".to_owned(),
        server_port: 25565,
        next_state: VarInt(2),
    });
    let decoded = round_trip(ServerBound, EventState::Handshake, event.clone());
    assert_eq!(decoded, event);
}

#[test]
fn status_request_and_response_round_trip() {
    let request = round_trip(ServerBound, EventState::Status, Event::StatusRequest(StatusRequest {}));
    assert!(matches!(request, Event::StatusRequest(_)));

    let response = Event::StatusResponse(StatusResponse {
        response: r#"{"version":{"name":"1.8.9","protocol":47}}"#.to_owned(),
    });
    let decoded = round_trip(ClientBound, EventState::Status, response.clone());
    assert_eq!(decoded, response);
}

#[test]
fn unknown_packet_id_decodes_as_raw_passthrough() {
    let framed = encode_framed(&Event::Raw {
        id: 0x7f,
        payload: vec![1, 2, 3],
    })
    .unwrap();
    let mut cursor = Cursor::new(&framed);
    let id = VarInt::read_from(&mut cursor).unwrap().0;
    let decoded = decode(ClientBound, EventState::Play, id, &mut cursor).unwrap();
    match decoded {
        Event::Raw { id, payload } => {
            assert_eq!(id, 0x7f);
            assert_eq!(payload, vec![1, 2, 3]);
        }
        other => panic!("expected Raw, got {:?}", other),
    }
}
