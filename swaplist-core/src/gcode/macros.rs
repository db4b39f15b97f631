//! Vendor G-code sequences driving the bed-swap mechanism.
//!
//! These strings are consumed by printer firmware and must stay
//! byte-for-byte identical, including trailing spaces.

/// Emitted once at the start of every swap job: homes XY and seats the first plate.
pub const SWAP_INIT_GCODE: &str = concat!(
    ";swap ini code\n",
    "G91 ; \n",
    "G0 Z50 F1000; \n",
    "G0 Z-20; \n",
    "G90; \n",
    " G28 XY; \n",
    " G0 Y-4 F5000; grab \n",
    " G0 Y145;  pull and fix the plate\n",
    "G0 Y115 F1000; rehook \n",
    " G0 Y180 F5000; pull\n",
    " G4 P500; wait  \n",
    " G0 Y186.5 F200; fix the plate\n",
    " G4 P500; wait  \n",
    " G0 Y3 F15000; back \n",
    " G0 Y-5 F200; snap \n",
    "G4 P500; wait  \n",
    " G0 Y10 F1000; load \n",
    " G0 Y20 F15000; ready \n",
    " \n",
);

/// Emitted after every printed copy: ejects the finished plate and loads the next.
pub const SWAP_SEQUENCE_GCODE: &str = concat!(
    ";swap \n",
    "G0 X-10 F5000; \n",
    " G0 Z175; \n",
    " G0 Y-5 F2000;  \n",
    "  G0 Y186.5 F2000;  \n",
    "  G0 Y182 F10000;  \n",
    "  G0 Z186 ; \n",
    " G0 Y120 F500; \n",
    " G0 Y-4 Z175 F5000; \n",
    " G0 Y145; \n",
    "  G0 Y115 F1000; \n",
    " G0 Y25 F500; \n",
    " G0 Y85 F1000; \n",
    " G0 Y180 F2000; \n",
    " G4 P500; wait  \n",
    " G0 Y186.5 F200; \n",
    " G4 P500; wait  \n",
    " G0 Y3 F3000; \n",
    " G0 Y-5 F200; \n",
    "G4 P500; wait  \n",
    " G0 Y10 F1000; \n",
    " G0 Z100 Y186 F2000; \n",
    " G0 Y150; \n",
    " G4 P1000; wait  \n",
    " \n",
);
