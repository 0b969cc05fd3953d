//! SAT>IP collaborator: the RTSP control session plus the UDP/RTP receiver.
//! The core (§4.1-§4.7) only ever sees the `SatIpCollaborator` trait; this
//! module's `TcpSatIpClient` is the one concrete implementation shipped so
//! the binary is runnable end to end.

use std::io::{BufRead, BufReader, Read, Write};
use std::net::{TcpStream, UdpSocket};
use std::os::unix::io::{AsRawFd, BorrowedFd};
use std::time::Duration;

use nix::poll::{poll, PollFd, PollFlags, PollTimeout};

/// Everything the Scan Driver needs from an RTSP/SAT>IP session, kept
/// behind a trait so §4.1-§4.7 never depend on socket types directly.
pub trait SatIpCollaborator {
    fn setup(&mut self, tune_query: &str, client_port: u16) -> Result<(String, String), String>;
    fn set_pids(&mut self, stream_id: &str, session_id: &str, tune_query: &str, pids: &[u16]) -> Result<(), String>;
    fn teardown(&mut self, stream_id: &str, session_id: &str);
    fn control_ready(&self, timeout: Duration) -> Result<bool, String>;
    fn read_control(&mut self) -> Result<Vec<u8>, String>;
    fn udp_ready(&self, timeout: Duration) -> Result<bool, String>;
    fn read_udp(&mut self, buf: &mut [u8]) -> Result<usize, String>;
    fn local_udp_port(&self) -> u16;
}

fn poll_readable(fd: std::os::unix::io::RawFd, timeout: Duration) -> Result<bool, String> {
    let borrowed = unsafe { BorrowedFd::borrow_raw(fd) };
    let mut poll_fd = PollFd::new(borrowed, PollFlags::POLLIN);
    let poll_timeout = PollTimeout::try_from(timeout.as_millis() as i32).unwrap_or(PollTimeout::NONE);
    let nfds = poll(std::slice::from_mut(&mut poll_fd), poll_timeout).map_err(|e| format!("poll failed: {e}"))?;
    Ok(nfds > 0)
}

pub struct TcpSatIpClient {
    host: String,
    port: u16,
    control: TcpStream,
    udp: UdpSocket,
    cseq: u32,
}

impl TcpSatIpClient {
    pub fn connect(host: &str, port: u16) -> Result<Self, String> {
        let control = TcpStream::connect((host, port)).map_err(|e| format!("rtsp connect to {host}:{port}: {e}"))?;
        control.set_nodelay(true).map_err(|e| format!("set_nodelay: {e}"))?;
        let udp = UdpSocket::bind(("0.0.0.0", 0)).map_err(|e| format!("udp bind: {e}"))?;
        Ok(TcpSatIpClient { host: host.to_string(), port, control, udp, cseq: 0 })
    }

    fn next_cseq(&mut self) -> u32 {
        self.cseq += 1;
        self.cseq
    }

    fn send_request(&mut self, method: &str, uri: &str, extra_headers: &[String]) -> Result<String, String> {
        let cseq = self.next_cseq();
        let mut request = format!("{method} {uri} RTSP/1.0\r\nCSeq: {cseq}\r\n");
        for header in extra_headers {
            request.push_str(header);
            request.push_str("\r\n");
        }
        request.push_str("\r\n");
        self.control.write_all(request.as_bytes()).map_err(|e| format!("rtsp write: {e}"))?;

        let mut reader = BufReader::new(&self.control);
        let mut status_line = String::new();
        reader.read_line(&mut status_line).map_err(|e| format!("rtsp read: {e}"))?;
        if !status_line.contains("200") {
            return Err(format!("rtsp {method} failed: {}", status_line.trim()));
        }

        let mut headers = String::new();
        loop {
            let mut line = String::new();
            let n = reader.read_line(&mut line).map_err(|e| format!("rtsp read: {e}"))?;
            if n == 0 || line == "\r\n" || line == "\n" {
                break;
            }
            headers.push_str(&line);
        }
        Ok(headers)
    }

    fn uri(&self, tune_query: &str, stream_id: Option<&str>) -> String {
        match stream_id {
            Some(id) => format!("rtsp://{}:{}/stream={id}?{tune_query}", self.host, self.port),
            None => format!("rtsp://{}:{}/?{tune_query}", self.host, self.port),
        }
    }
}

impl SatIpCollaborator for TcpSatIpClient {
    fn setup(&mut self, tune_query: &str, client_port: u16) -> Result<(String, String), String> {
        let uri = self.uri(tune_query, None);
        let transport = format!("Transport: RTP/AVP;unicast;client_port={client_port}-{}", client_port + 1);
        let headers = self.send_request("SETUP", &uri, &[transport])?;

        let session_id = headers
            .lines()
            .find_map(|l| l.strip_prefix("Session: ").or_else(|| l.strip_prefix("session: ")))
            .map(|v| v.split(';').next().unwrap_or(v).trim().to_string())
            .ok_or_else(|| "rtsp setup response missing Session header".to_string())?;

        let stream_id = headers
            .lines()
            .find_map(|l| l.find("com.ses.streamID=").map(|i| &l[i + "com.ses.streamID=".len()..]))
            .map(|v| v.trim_end_matches(|c: char| !c.is_ascii_digit()).to_string())
            .unwrap_or_else(|| "0".to_string());

        let play_uri = self.uri(tune_query, Some(&stream_id));
        let session_header = format!("Session: {session_id}");
        self.send_request("PLAY", &play_uri, &[session_header])?;

        Ok((session_id, stream_id))
    }

    fn set_pids(&mut self, stream_id: &str, session_id: &str, tune_query: &str, pids: &[u16]) -> Result<(), String> {
        let pid_csv = if pids.is_empty() {
            "none".to_string()
        } else {
            pids.iter().map(|p| p.to_string()).collect::<Vec<_>>().join(",")
        };
        let query = format!("{tune_query}&pids={pid_csv}");
        let uri = self.uri(&query, Some(stream_id));
        let session_header = format!("Session: {session_id}");
        self.send_request("PLAY", &uri, &[session_header]).map(|_| ())
    }

    fn teardown(&mut self, stream_id: &str, session_id: &str) {
        let uri = self.uri("", Some(stream_id));
        let session_header = format!("Session: {session_id}");
        let _ = self.send_request("TEARDOWN", &uri, &[session_header]);
    }

    fn control_ready(&self, timeout: Duration) -> Result<bool, String> {
        poll_readable(self.control.as_raw_fd(), timeout)
    }

    fn read_control(&mut self) -> Result<Vec<u8>, String> {
        let mut buf = [0u8; 4096];
        let n = self.control.read(&mut buf).map_err(|e| format!("rtsp control read: {e}"))?;
        Ok(buf[..n].to_vec())
    }

    fn udp_ready(&self, timeout: Duration) -> Result<bool, String> {
        poll_readable(self.udp.as_raw_fd(), timeout)
    }

    fn read_udp(&mut self, buf: &mut [u8]) -> Result<usize, String> {
        self.udp.recv(buf).map_err(|e| format!("udp read: {e}"))
    }

    fn local_udp_port(&self) -> u16 {
        self.udp.local_addr().map(|a| a.port()).unwrap_or(0)
    }
}
