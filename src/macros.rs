//! Packet-definition macro.
//!
//! Adapted from `schctl-tetsu`'s `versions::macros::protocol_impl!`, trimmed
//! down now that only one protocol version is supported (the `inherit {}`
//! block for sharing packets across versions is gone) and decoupled from
//! framing: this crate's `stream.rs` owns length-prefixing and compression
//! (§4.B), so a packet macro only needs to produce the struct, its
//! `Packet`/`Readable`/`Writable` impls, and nothing else. Packets whose
//! wire shape isn't a flat field list (teams, player-list-item, entity
//! metadata) are written out by hand instead of forced through this macro.
macro_rules! packet {
    (
        $(
            $(#[$meta:meta])*
            ($id:expr) $direction:ident $state:ident $name:ident {
                $($field_name:ident: $field_type:ty,)*
            }
        )*
    ) => {
        $(
            $(#[$meta])*
            #[derive(Debug, Clone, PartialEq)]
            pub struct $name {
                $(pub $field_name: $field_type,)*
            }

            impl $crate::serialization::Packet for $name {
                const ID: i32 = $id;
                const DIRECTION: $crate::event::EventDirection = $crate::event::EventDirection::$direction;
                const STATE: $crate::event::EventState = $crate::event::EventState::$state;
            }

            impl $crate::serialization::Readable for $name {
                #[inline]
                #[allow(unused_variables)]
                fn read_from<__T: std::io::Read>(_buf: &mut __T) -> $crate::TetsuResult<Self> {
                    use $crate::serialization::Readable as _;
                    Ok(Self {
                        $($field_name: <$field_type>::read_from(_buf)?,)*
                    })
                }
            }

            impl $crate::serialization::Writable for $name {
                #[inline]
                #[allow(unused_variables)]
                fn write_to<__T: std::io::Write>(&self, _buf: &mut __T) -> $crate::TetsuResult<()> {
                    use $crate::serialization::Writable as _;
                    $(self.$field_name.write_to(_buf)?;)*
                    Ok(())
                }
            }
        )*
    };
}
